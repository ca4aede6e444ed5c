use super::instructions::{get_i16, get_i32, put_i16, put_i32};
use super::{
    Chain, Instruction, Jump, State, Uninit, VFrame, VType, GOTO, GOTO_W, JSR, JSR_W, LOOKUPSWITCH,
    TABLESWITCH,
};
use crate::jvm::class_file::{
    Attribute, BytecodeArray, BytecodeIndex, ClassConstantIndex, Code,
    ConstantIndex, ConstantsPool, ConstantsWriter, ExceptionHandler, LineNumber, LineNumberTable,
    LocalVariable, LocalVariableTable, LocalVariableTypeTable, StackMapTable,
};
use crate::jvm::hierarchy::ClassHierarchy;
use crate::jvm::verifier::{ClassFileFrame, VerificationType};
use crate::jvm::{BinaryName, Error, FieldType, InternalErrorKind, Name, RefType, RenderDescriptor, UnqualifiedName};
use crate::util::{OffsetVec, Width};
use std::convert::TryFrom;

/// Largest method body, locals array, or operand stack the class file format allows
pub const MAX_CODE: usize = 0xFFFF;
pub const MAX_LOCALS: usize = 0xFFFF;
pub const MAX_STACK: usize = 0xFFFF;

/*

Jump chains and dead code
=========================

Code is emitted strictly forward in a single pass. Forward jumps are emitted with a placeholder
offset and collected into a `Chain`, which gets resolved once the target is known. Resolving to the
current position doesn't happen right away: the chain becomes "pending" and is only patched when
the next instruction is emitted (or someone asks for the current position). This gives two peephole
optimizations for free:

  - a `goto` whose target is itself a `goto` jumps straight to the final target
  - a `goto` to the very next instruction is dropped altogether, unless the position after it has
    already been observed (`fixed_pc`)

Code after an unconditional transfer is dead and emitting into dead code is a no-op. Code becomes
alive again when a jump chain is resolved to the current position, or at an explicit entry point
(switch cases, exception handlers).

Narrow and wide jumps
=====================

Jump offsets are first emitted as 16-bit values. If any of them turns out to not fit, the builder
records that the method needs wide jumps and the whole method is generated again with `goto_w`
and `jsr_w`, conditional jumps becoming a negated conditional jump over a `goto_w`.

*/

/// Which debugging and verification information to produce
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CodeSettings {
    /// Record a stack map frame at every branch target (class versions 50 and up)
    pub emit_stack_maps: bool,

    /// Generate `LineNumberTable`
    pub line_numbers: bool,

    /// Generate `LocalVariableTable` (and `LocalVariableTypeTable`)
    pub local_variables: bool,
}

/// Name and type of a source-level local variable, for the debugging tables
#[derive(Clone, Debug, PartialEq)]
pub struct LocalDebugInfo {
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,

    /// Generic signature, if it differs from the descriptor
    pub signature: Option<String>,
}

/// Local variable register currently in scope
#[derive(Clone, Debug)]
struct LocalVar {
    /// Declared type (this is what ends up in stack map frames)
    vtype: VType,

    /// `None` for compiler temporaries
    debug: Option<LocalDebugInfo>,

    /// Offset of the first definite assignment
    start: Option<usize>,
}

/// Closed live range, for the `LocalVariableTable`
#[derive(Clone, Debug)]
struct LocalRange {
    start: usize,
    length: usize,
    reg: u16,
    debug: LocalDebugInfo,
}

/// Row of the exception table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatchEntry {
    pub start: u16,
    pub end: u16,
    pub handler: u16,

    /// `None` catches everything (used for `finally` and `synchronized`)
    pub catch_type: Option<BinaryName>,
}

/// Bytecode buffer for a single method body
///
/// The builder simulates the abstract machine state while instructions are emitted, which is how
/// it knows the maximum stack depth and what stack map frames to record at branch targets.
pub struct CodeBuilder<'a> {
    pool: &'a mut ConstantsPool,
    hierarchy: &'a dyn ClassHierarchy,

    /// Class whose method this is (what `UninitializedThis` becomes)
    this_class: BinaryName,

    settings: CodeSettings,

    code: Vec<u8>,
    state: State,

    /// Is the current position reachable by falling through from the previous instruction?
    alive: bool,

    /// Emit every jump in its wide form
    wide: bool,

    /// Some narrow jump offset overflowed, so the method needs to be generated again with wide
    /// jumps
    needs_wide: bool,

    /// The current position has been observed, so code before it can't be removed
    fixed_pc: bool,

    /// Jumps to the current position, resolved lazily
    pending_jumps: Option<Chain>,

    /// Jump instructions emitted whose offset hasn't been patched yet
    unresolved_jumps: usize,

    /// Record a stack map frame before the next instruction
    pending_stack_map: bool,

    /// Line of the statement whose first instruction is next
    pending_line: Option<u16>,
    line_numbers: Vec<(usize, u16)>,

    max_stack: usize,
    max_locals: usize,
    next_reg: usize,
    locals: Vec<Option<LocalVar>>,
    local_ranges: Vec<LocalRange>,

    initial_frame: VFrame,
    frames: Vec<(usize, VFrame)>,
    catches: Vec<CatchEntry>,
}

impl<'a> CodeBuilder<'a> {
    pub fn new(
        pool: &'a mut ConstantsPool,
        hierarchy: &'a dyn ClassHierarchy,
        this_class: BinaryName,
        settings: CodeSettings,
        wide: bool,
    ) -> CodeBuilder<'a> {
        CodeBuilder {
            pool,
            hierarchy,
            this_class,
            settings,
            code: vec![],
            state: State::new(),
            alive: true,
            wide,
            needs_wide: wide,
            fixed_pc: false,
            pending_jumps: None,
            unresolved_jumps: 0,
            pending_stack_map: false,
            pending_line: None,
            line_numbers: vec![],
            max_stack: 0,
            max_locals: 0,
            next_reg: 0,
            locals: vec![],
            local_ranges: vec![],
            initial_frame: VFrame::new(OffsetVec::new(), OffsetVec::new()),
            frames: vec![],
            catches: vec![],
        }
    }

    pub fn pool(&mut self) -> &mut ConstantsPool {
        self.pool
    }

    pub fn hierarchy(&self) -> &'a dyn ClassHierarchy {
        self.hierarchy
    }

    pub fn settings(&self) -> CodeSettings {
        self.settings
    }

    pub fn this_class(&self) -> &BinaryName {
        &self.this_class
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Did some jump need a wide offset while this builder was emitting narrow ones?
    pub fn needs_wide_jumps(&self) -> bool {
        self.needs_wide && !self.wide
    }

    pub fn is_wide(&self) -> bool {
        self.wide
    }

    /// Is the current position reachable (including through pending jumps)?
    pub fn is_alive(&self) -> bool {
        self.alive || self.pending_jumps.is_some()
    }

    /// Mark the current position as unreachable
    pub fn mark_dead(&mut self) {
        self.alive = false;
    }

    /// Length of the code emitted so far, without any side effects
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    pub fn max_locals(&self) -> usize {
        self.max_locals
    }

    /// First register not in use
    pub fn next_reg(&self) -> u16 {
        self.next_reg as u16
    }

    /// Current code position
    ///
    /// Asking for the position resolves pending jumps and flushes the pending line number, and
    /// pins the position so that a `goto` right before it won't be optimized away.
    pub fn cur_pc(&mut self) -> Result<usize, Error> {
        if self.pending_jumps.is_some() {
            self.resolve_pending()?;
        }
        if self.pending_line.is_some() {
            self.mark_stat_begin();
        }
        self.fixed_pc = true;
        Ok(self.code.len())
    }

    fn note_stack_size(&mut self) {
        self.max_stack = self.max_stack.max(self.state.stack_size());
    }

    fn internal(&self, kind: InternalErrorKind) -> Error {
        Error::internal(self.code.len(), kind)
    }

    /// Bookkeeping before the first byte of an instruction gets emitted
    ///
    /// Returns `false` if the code is dead (in which case nothing should be emitted).
    fn begin_instruction(&mut self) -> Result<bool, Error> {
        if self.pending_jumps.is_some() {
            self.resolve_pending()?;
        }
        if !self.alive {
            return Ok(false);
        }
        if self.pending_line.is_some() {
            self.mark_stat_begin();
        }
        if self.pending_stack_map {
            self.pending_stack_map = false;
            self.record_frame();
        }
        Ok(true)
    }

    /// Emit an instruction, updating the simulated state
    pub fn emit(&mut self, insn: Instruction) -> Result<(), Error> {
        if !self.begin_instruction()? {
            return Ok(());
        }
        let pc = self.code.len();
        insn.encode(self.pool, &mut self.code)?;
        self.state
            .apply(&insn, pc, &self.this_class)
            .map_err(|kind| Error::internal(pc, kind))?;
        self.note_stack_size();

        match &insn {
            Instruction::IStore(reg)
            | Instruction::LStore(reg)
            | Instruction::FStore(reg)
            | Instruction::DStore(reg)
            | Instruction::AStore(reg) => self.set_defined(*reg),
            terminal if terminal.is_terminal() => self.mark_dead(),
            _ => (),
        }
        Ok(())
    }

    pub fn emit_all(&mut self, insns: impl IntoIterator<Item = Instruction>) -> Result<(), Error> {
        for insn in insns {
            self.emit(insn)?;
        }
        Ok(())
    }

    /// Emit a jump with a zero placeholder offset, returning the offset of the instruction to
    /// patch (a `goto`, `goto_w`, `jsr`, or `jsr_w`, or the conditional jump)
    fn emit_jump(&mut self, opcode: u8, pops: usize) -> Result<usize, Error> {
        if !self.begin_instruction()? {
            return Ok(self.code.len());
        }
        self.unresolved_jumps += 1;
        for _ in 0..pops {
            self.state.pop().map_err(|kind| self.internal(kind))?;
        }

        if !self.wide {
            self.code.extend_from_slice(&[opcode, 0, 0]);
            if opcode == GOTO {
                self.mark_dead();
            }
            return Ok(self.code.len() - 3);
        }

        if opcode == GOTO || opcode == JSR {
            let wide_opcode = if opcode == GOTO { GOTO_W } else { JSR_W };
            self.code.extend_from_slice(&[wide_opcode, 0, 0, 0, 0]);
            if opcode == GOTO {
                self.mark_dead();
            }
        } else {
            // Branch over the `goto_w` on the opposite condition
            let negated = negate_opcode(opcode)
                .ok_or_else(|| self.internal(InternalErrorKind::NotABranch(self.code.len())))?;
            self.code.extend_from_slice(&[negated, 0, 8]);
            self.code.extend_from_slice(&[GOTO_W, 0, 0, 0, 0]);
            self.pending_stack_map = self.settings.emit_stack_maps;
        }
        Ok(self.code.len() - 5)
    }

    /// Emit a branch, returning the chain to resolve once the target is known
    ///
    /// An unconditional `goto` absorbs the pending jumps to the current position (they will jump
    /// directly to the `goto` target instead). Branching from dead code produces nothing, as does
    /// `Jump::Never`.
    pub fn branch(&mut self, jump: Jump) -> Result<Option<Chain>, Error> {
        let mut result = None;
        if jump == Jump::Goto {
            result = self.pending_jumps.take();
        }
        if let (Some(opcode), true) = (jump.opcode(), self.is_alive()) {
            let pc = self.emit_jump(opcode, jump.pops())?;
            let site = Chain::new(pc, self.state.clone());
            result = Chain::merge(Some(site), result).map_err(|kind| self.internal(kind))?;
            self.fixed_pc = self.wide;
        }
        Ok(result)
    }

    /// Emit a `jsr` to a subroutine that hasn't been placed yet
    ///
    /// Execution continues after the `jsr` once the subroutine returns. At the subroutine entry,
    /// the return address is on top of the stack.
    pub fn jsr(&mut self) -> Result<Option<Chain>, Error> {
        if !self.is_alive() {
            return Ok(None);
        }
        let pc = self.emit_jump(JSR, 0)?;
        let mut entry_state = self.state.clone();
        entry_state.push(VerificationType::ReturnAddress);
        Ok(Some(Chain::new(pc, entry_state)))
    }

    /// Merge two chains (see [`Chain::merge`])
    pub fn merge_chains(&self, chain1: Option<Chain>, chain2: Option<Chain>) -> Result<Option<Chain>, Error> {
        Chain::merge(chain1, chain2).map_err(|kind| self.internal(kind))
    }

    /// Make the chain jump to the current position (patched lazily, see [`Self::cur_pc`])
    pub fn resolve(&mut self, chain: Option<Chain>) -> Result<(), Error> {
        let pending = self.pending_jumps.take();
        self.pending_jumps = Chain::merge(chain, pending).map_err(|kind| self.internal(kind))?;
        Ok(())
    }

    /// Resolve the pending jumps to the current position now
    pub fn resolve_pending(&mut self) -> Result<(), Error> {
        let pending = self.pending_jumps.take();
        let target = self.code.len();
        self.resolve_to(pending, target)
    }

    /// Patch every jump in the chain to land at `target` (which must be an instruction boundary
    /// at or before the current position)
    pub fn resolve_to(&mut self, chain: Option<Chain>, target: usize) -> Result<(), Error> {
        let sites = match chain {
            None => return Ok(()),
            Some(chain) => chain.into_sites(),
        };
        let site_count = sites.len();
        self.unresolved_jumps = self.unresolved_jumps.saturating_sub(site_count);
        let mut new_state: Option<State> = None;

        for (i, site) in sites.into_iter().enumerate() {
            let mut target = target;
            if target >= self.code.len() {
                target = self.code.len();
            } else if !self.wide && self.code[target] == GOTO {
                // Jump straight to where the `goto` goes
                target = (target as isize + get_i16(&self.code, target + 1) as isize) as usize;
            }

            let opcode = self.code[site.pc];
            if opcode == GOTO
                && site.pc + 3 == target
                && target == self.code.len()
                && !self.fixed_pc
            {
                log::trace!("dropping goto at {} to the next instruction", site.pc);
                self.retract(3);
                target -= 3;
                if i + 1 == site_count {
                    // Only jump here: the code is reachable from before the `goto`, with the
                    // same state
                    self.alive = true;
                    break;
                }
            } else {
                if !is_jump_opcode(opcode) {
                    return Err(self.internal(InternalErrorKind::NotABranch(site.pc)));
                }
                let offset = target as isize - site.pc as isize;
                log::trace!("resolving jump at {} to {} (offset {})", site.pc, target, offset);
                if self.wide {
                    put_i32(&mut self.code, site.pc + 1, offset as i32);
                } else if let Ok(offset) = i16::try_from(offset) {
                    put_i16(&mut self.code, site.pc + 1, offset);
                } else {
                    log::debug!("jump offset {} at {} needs wide jumps", offset, site.pc);
                    self.needs_wide = true;
                }
                let current = new_state.as_ref().unwrap_or(&self.state);
                if self.alive
                    && (site.state.stack_size() != current.stack_size()
                        || site.state.locks != current.locks)
                {
                    return Err(self.internal(InternalErrorKind::IncompatibleStates(format!(
                        "jump from {} to {} with stack {:?}, expected {:?}",
                        site.pc, target, site.state.stack, current.stack
                    ))));
                }
            }
            self.fixed_pc = true;

            if self.code.len() == target {
                new_state = Some(if self.alive {
                    let current = new_state.as_ref().unwrap_or(&self.state);
                    site.state
                        .join(current, self.hierarchy)
                        .map_err(|kind| Error::internal(target, kind))?
                } else {
                    self.alive = true;
                    site.state
                });
            }
        }

        if let Some(state) = new_state {
            self.state = state;
            self.note_stack_size();
            self.pending_stack_map = self.settings.emit_stack_maps;
        }
        Ok(())
    }

    /// Remove the last `bytes` bytes of code
    fn retract(&mut self, bytes: usize) {
        let new_len = self.code.len() - bytes;
        self.code.truncate(new_len);
        for local in self.locals.iter_mut().flatten() {
            if let Some(start) = &mut local.start {
                *start = (*start).min(new_len);
            }
        }
        if let Some((pc, _)) = self.frames.last() {
            if *pc > new_len {
                self.frames.pop();
            }
        }
        if let Some((pc, _)) = self.line_numbers.last() {
            if *pc > new_len {
                self.line_numbers.pop();
            }
        }
    }

    /// Mark the current position as reachable, keeping the current state
    pub fn entry_point(&mut self) -> Result<usize, Error> {
        let pc = self.cur_pc()?;
        self.alive = true;
        self.pending_stack_map = self.settings.emit_stack_maps;
        Ok(pc)
    }

    /// Mark the current position as reachable in the given state, optionally with a value pushed
    /// (the caught exception, for handlers)
    pub fn entry_point_with(&mut self, state: &State, pushed: Option<VType>) -> Result<usize, Error> {
        let pc = self.cur_pc()?;
        self.alive = true;
        self.state = state.clone();
        if let Some(pushed) = pushed {
            self.state.push(pushed);
        }
        self.note_stack_size();
        self.pending_stack_map = self.settings.emit_stack_maps;
        Ok(pc)
    }

    /// Start the method body: the current state becomes the implicit initial frame
    pub fn begin_body(&mut self) {
        self.alive = true;
        self.initial_frame = self.state.frame();
        self.pending_stack_map = false;
    }

    fn record_frame(&mut self) {
        if !self.settings.emit_stack_maps {
            return;
        }
        let pc = self.code.len();
        if let Some((last_pc, _)) = self.frames.last() {
            if *last_pc == pc {
                self.frames.pop();
            }
        }
        self.frames.push((pc, self.state.frame()));
    }

    /// Remember the line of the statement about to be generated
    pub fn stat_begin(&mut self, line: Option<u16>) {
        if line.is_some() {
            self.pending_line = line;
        }
    }

    /// Forget the pending line (the statement turned out to produce no code)
    pub fn clear_pending_line(&mut self) {
        self.pending_line = None;
    }

    pub fn pending_line(&self) -> Option<u16> {
        self.pending_line
    }

    /// Record the pending line as starting at the current position
    pub fn mark_stat_begin(&mut self) {
        if let Some(line) = self.pending_line.take() {
            if self.alive && self.settings.line_numbers {
                let pc = self.code.len();
                if let Some((last_pc, _)) = self.line_numbers.last() {
                    if *last_pc == pc {
                        self.line_numbers.pop();
                    }
                }
                if self.line_numbers.last().map(|(_, last)| *last) != Some(line) {
                    self.line_numbers.push((pc, line));
                }
            }
        }
    }

    /// Allocate a register for a new local (or temporary) at the next free register
    pub fn new_local(&mut self, vtype: VType, debug: Option<LocalDebugInfo>) -> Result<u16, Error> {
        let reg = self.next_reg;
        self.next_reg = reg + vtype.width();
        if self.next_reg > MAX_LOCALS {
            return Err(Error::TooManyLocals(self.next_reg));
        }
        self.max_locals = self.max_locals.max(self.next_reg);
        if self.locals.len() < self.next_reg {
            self.locals.resize(self.next_reg, None);
        }
        self.locals[reg] = Some(LocalVar {
            vtype,
            debug,
            start: None,
        });
        self.state.undefine(reg as u16);
        Ok(reg as u16)
    }

    /// Mark a register as definitely assigned (with its declared type), opening its live range
    pub fn set_defined(&mut self, reg: u16) {
        let pc = self.code.len();
        if let Some(Some(local)) = self.locals.get_mut(reg as usize) {
            self.state.set_local(reg, local.vtype.clone());
            if local.start.is_none() && pc < MAX_CODE {
                local.start = Some(pc);
            }
        }
    }

    /// Registers allocated from now on won't overlap any register used so far in the method
    pub fn new_reg_segment(&mut self) {
        self.next_reg = self.max_locals;
    }

    /// End the scope of every register from `first` upwards
    pub fn end_scopes(&mut self, first: u16) -> Result<(), Error> {
        let previous_next_reg = self.next_reg;
        self.next_reg = first as usize;
        for reg in first as usize..previous_next_reg {
            self.end_scope(reg as u16)?;
        }
        Ok(())
    }

    fn end_scope(&mut self, reg: u16) -> Result<(), Error> {
        let local = self.locals.get_mut(reg as usize).and_then(Option::take);
        if let Some(LocalVar {
            debug: Some(debug),
            start: Some(start),
            ..
        }) = local
        {
            let end = self.cur_pc()?;
            let length = end - start;
            if length < MAX_CODE {
                self.local_ranges.push(LocalRange {
                    start,
                    length,
                    reg,
                    debug,
                });
            }
        }
        self.state.undefine(reg);
        Ok(())
    }

    /// Emit `tableswitch` or `lookupswitch` (without its operands), returning its offset
    pub fn emit_switch(&mut self, table: bool) -> Result<Option<usize>, Error> {
        if !self.begin_instruction()? {
            return Ok(None);
        }
        let pc = self.code.len();
        self.code.push(if table { TABLESWITCH } else { LOOKUPSWITCH });
        self.state.pop().map_err(|kind| Error::internal(pc, kind))?;
        Ok(Some(pc))
    }

    /// Pad with zero bytes to a multiple of `alignment`
    pub fn align(&mut self, alignment: usize) {
        if self.alive {
            while self.code.len() % alignment != 0 {
                self.code.push(0);
            }
        }
    }

    /// Emit a raw 32-bit operand
    pub fn emit4(&mut self, value: i32) {
        if self.alive {
            self.code.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn put4(&mut self, at: usize, value: i32) {
        put_i32(&mut self.code, at, value);
    }

    pub fn get4(&self, at: usize) -> i32 {
        get_i32(&self.code, at)
    }

    /// Add a row to the exception table
    pub fn add_catch(&mut self, entry: CatchEntry) {
        self.catches.push(entry);
    }

    pub fn catches(&self) -> &[CatchEntry] {
        &self.catches
    }

    /// Drop empty exception ranges, and one-byte ranges that only cover the first instruction of a
    /// handler
    pub fn compress_catch_table(&mut self) {
        let handlers: Vec<u16> = self.catches.iter().map(|entry| entry.handler).collect();
        self.catches.retain(|entry| {
            let empty = entry.start == entry.end;
            let handler_only = entry.start + 1 == entry.end && handlers.contains(&entry.start);
            !(empty || handler_only)
        });
    }

    /// Check the class file limits on code size, locals, and stack depth
    pub fn check_limits(&self) -> Result<(), Error> {
        if self.code.len() > MAX_CODE {
            return Err(Error::CodeTooLarge(self.code.len()));
        }
        if self.max_locals > MAX_LOCALS {
            return Err(Error::TooManyLocals(self.max_locals));
        }
        if self.max_stack > MAX_STACK {
            return Err(Error::StackTooDeep(self.max_stack));
        }
        Ok(())
    }

    /// Frames recorded at branch targets so far
    pub fn frames(&self) -> &[(usize, VFrame)] {
        &self.frames
    }

    /// Build the `Code` attribute body
    ///
    /// Every jump emitted must have been resolved by now.
    pub fn finish(self) -> Result<Code, Error> {
        self.check_limits()?;
        if self.unresolved_jumps > 0 {
            let kind = InternalErrorKind::UnresolvedJumps(self.unresolved_jumps);
            return Err(self.internal(kind));
        }
        let CodeBuilder {
            pool,
            settings,
            code,
            max_stack,
            max_locals,
            line_numbers,
            local_ranges,
            initial_frame,
            frames,
            catches,
            ..
        } = self;

        let mut exception_table = vec![];
        for entry in &catches {
            let catch_type = match &entry.catch_type {
                None => ConstantIndex(0),
                Some(class) => class.constant_index(pool)?.into(),
            };
            exception_table.push(ExceptionHandler {
                start_pc: BytecodeIndex(entry.start),
                end_pc: BytecodeIndex(entry.end),
                handler_pc: BytecodeIndex(entry.handler),
                catch_type,
            });
        }

        let mut attributes: Vec<Attribute> = vec![];
        if settings.line_numbers && !line_numbers.is_empty() {
            let lines = line_numbers
                .iter()
                .map(|(pc, line)| LineNumber {
                    start_pc: BytecodeIndex(*pc as u16),
                    line_number: *line,
                })
                .collect();
            attributes.push(pool.get_attribute(LineNumberTable(lines))?);
        }

        if settings.local_variables && !local_ranges.is_empty() {
            let mut variables = vec![];
            let mut typed_variables = vec![];
            for range in &local_ranges {
                let name_index = pool.get_utf8(range.debug.name.as_str())?;
                let descriptor_index = pool.get_utf8(range.debug.descriptor.render())?;
                let variable = LocalVariable {
                    start_pc: BytecodeIndex(range.start as u16),
                    length: range.length as u16,
                    name_index,
                    descriptor_index,
                    index: range.reg,
                };
                variables.push(variable);
                if let Some(signature) = &range.debug.signature {
                    let descriptor_index = pool.get_utf8(signature.as_str())?;
                    typed_variables.push(LocalVariable {
                        descriptor_index,
                        ..variable
                    });
                }
            }
            attributes.push(pool.get_attribute(LocalVariableTable(variables))?);
            if !typed_variables.is_empty() {
                attributes.push(pool.get_attribute(LocalVariableTypeTable(typed_variables))?);
            }
        }

        if settings.emit_stack_maps && !frames.is_empty() {
            let mut previous = class_file_frame(&initial_frame, pool)?;
            let mut previous_pc: Option<usize> = None;
            let mut table = vec![];
            for (pc, frame) in &frames {
                let frame = class_file_frame(frame, pool)?;
                let offset_delta = match previous_pc {
                    None => *pc,
                    Some(previous_pc) => pc - previous_pc - 1,
                };
                table.push(frame.stack_map_frame(offset_delta as u16, &previous));
                previous = frame;
                previous_pc = Some(*pc);
            }
            attributes.push(pool.get_attribute(StackMapTable(table))?);
        }

        Ok(Code {
            max_stack: max_stack as u16,
            max_locals: max_locals as u16,
            code_array: BytecodeArray(code),
            exception_table,
            attributes,
        })
    }
}

/// Turn symbolic classes into constant pool entries
fn class_file_frame(frame: &VFrame, pool: &mut ConstantsPool) -> Result<ClassFileFrame, Error> {
    let mut convert = |vtype: &VType| -> Result<VerificationType<ClassConstantIndex, u16>, Error> {
        vtype.try_map(
            |ref_type: &RefType<BinaryName>| ref_type.constant_index(pool),
            |uninit: &Uninit| Ok(uninit.pc),
        )
    };
    let mut locals = OffsetVec::new();
    for vtype in frame.locals.values() {
        locals.push(convert(vtype)?);
    }
    let mut stack = OffsetVec::new();
    for vtype in frame.stack.values() {
        stack.push(convert(vtype)?);
    }
    Ok(ClassFileFrame::new(locals, stack))
}

fn is_jump_opcode(opcode: u8) -> bool {
    matches!(opcode, 0x99..=0xa8 | 0xc6..=0xc9)
}

/// Opcode of the conditional jump with the opposite condition
fn negate_opcode(opcode: u8) -> Option<u8> {
    match opcode {
        // `ifeq`..`if_acmpne` come in pairs: eq/ne, lt/ge, gt/le
        0x99..=0xa6 => Some(if (opcode - 0x99) % 2 == 0 { opcode + 1 } else { opcode - 1 }),
        0xc6 => Some(0xc7),
        0xc7 => Some(0xc6),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::hierarchy::ClassGraph;
    use crate::jvm::verifier::VerificationType::*;
    use crate::jvm::class_file::StackMapFrame;
    use crate::jvm::code::OrdComparison;

    fn settings() -> CodeSettings {
        CodeSettings {
            emit_stack_maps: true,
            line_numbers: true,
            local_variables: true,
        }
    }

    fn this() -> BinaryName {
        BinaryName::from_string(String::from("demo/Main")).unwrap()
    }

    #[test]
    fn negated_opcodes_pair_up() {
        assert_eq!(negate_opcode(0x99), Some(0x9a)); // ifeq -> ifne
        assert_eq!(negate_opcode(0x9c), Some(0x9b)); // ifge -> iflt
        assert_eq!(negate_opcode(0xa4), Some(0xa3)); // if_icmple -> if_icmpgt
        assert_eq!(negate_opcode(0xa5), Some(0xa6));
        assert_eq!(negate_opcode(GOTO), None);
    }

    #[test]
    fn goto_to_next_instruction_is_dropped() {
        let mut pool = ConstantsPool::new();
        let graph = ClassGraph::new();
        let mut code = CodeBuilder::new(&mut pool, &graph, this(), settings(), false);
        code.begin_body();
        let exit = code.branch(Jump::Goto).unwrap();
        assert_eq!(code.code_len(), 3);
        assert!(!code.is_alive());
        code.resolve(exit).unwrap();
        code.emit(Instruction::Return).unwrap();
        assert_eq!(code.code(), &[0xb1]);
    }

    #[test]
    fn observed_position_keeps_goto() {
        let mut pool = ConstantsPool::new();
        let graph = ClassGraph::new();
        let mut code = CodeBuilder::new(&mut pool, &graph, this(), settings(), false);
        code.begin_body();
        let exit = code.branch(Jump::Goto).unwrap();
        code.cur_pc().unwrap();
        code.resolve(exit).unwrap();
        code.emit(Instruction::Return).unwrap();
        assert_eq!(code.code(), &[GOTO, 0, 3, 0xb1]);
    }

    #[test]
    fn conditional_records_frames() {
        let mut pool = ConstantsPool::new();
        let graph = ClassGraph::new();
        let mut code = CodeBuilder::new(&mut pool, &graph, this(), settings(), false);
        let reg = code.new_local(Integer, None).unwrap();
        code.set_defined(reg);
        code.begin_body();

        code.emit(Instruction::ILoad(reg)).unwrap();
        let skip = code.branch(Jump::If(OrdComparison::EQ)).unwrap();
        code.emit(Instruction::IInc(reg, 1)).unwrap();
        code.resolve(skip).unwrap();
        code.emit(Instruction::Return).unwrap();

        assert_eq!(code.code(), &[0x1a, 0x99, 0, 6, 0x84, 0, 1, 0xb1]);
        assert_eq!(code.frames().len(), 1);
        assert_eq!(code.frames()[0].0, 7);
        assert_eq!(code.max_stack(), 1);

        let attribute = code.finish().unwrap();
        assert_eq!(attribute.max_locals, 1);
        let name = pool.get_utf8("StackMapTable").unwrap();
        let table: StackMapTable = attribute
            .attributes
            .iter()
            .find(|attr| attr.name_index == name)
            .map(|attr| attr.decode_info().unwrap())
            .unwrap();
        assert_eq!(table.0, vec![StackMapFrame::SameLocalsNoStack { offset_delta: 7 }]);
    }

    #[test]
    fn unresolved_jump_fails_finish() {
        let mut pool = ConstantsPool::new();
        let graph = ClassGraph::new();
        let mut code = CodeBuilder::new(&mut pool, &graph, this(), settings(), false);
        let reg = code.new_local(Integer, None).unwrap();
        code.set_defined(reg);
        code.begin_body();

        code.emit(Instruction::ILoad(reg)).unwrap();
        let _forgotten = code.branch(Jump::If(OrdComparison::EQ)).unwrap();
        code.emit(Instruction::Return).unwrap();

        match code.finish() {
            Err(Error::Internal(err)) => {
                assert!(matches!(err.kind, InternalErrorKind::UnresolvedJumps(1)));
                assert_eq!(err.pc, 5);
            }
            other => panic!("expected an internal error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn resolved_back_edge_finishes() {
        let mut pool = ConstantsPool::new();
        let graph = ClassGraph::new();
        let mut code = CodeBuilder::new(&mut pool, &graph, this(), settings(), false);
        code.begin_body();

        let start = code.entry_point().unwrap();
        let back = code.branch(Jump::Goto).unwrap();
        code.resolve_to(back, start).unwrap();
        assert_eq!(code.code(), &[GOTO, 0, 0]);
        assert!(code.finish().is_ok());
    }

    #[test]
    fn wide_mode_uses_goto_w() {
        let mut pool = ConstantsPool::new();
        let graph = ClassGraph::new();
        let mut code = CodeBuilder::new(&mut pool, &graph, this(), settings(), true);
        code.begin_body();
        code.emit(Instruction::IConst0).unwrap();
        let skip = code.branch(Jump::If(OrdComparison::NE)).unwrap();
        code.emit(Instruction::Nop).unwrap();
        code.resolve(skip).unwrap();
        code.emit(Instruction::Return).unwrap();
        assert_eq!(
            code.code(),
            &[0x03, 0x99, 0, 8, GOTO_W, 0, 0, 0, 6, 0x00, 0xb1]
        );
        assert!(!code.needs_wide_jumps());
    }

    #[test]
    fn overflowing_offset_requests_wide_jumps() {
        let mut pool = ConstantsPool::new();
        let graph = ClassGraph::new();
        let mut code = CodeBuilder::new(&mut pool, &graph, this(), settings(), false);
        code.begin_body();
        code.emit(Instruction::IConst0).unwrap();
        let skip = code.branch(Jump::If(OrdComparison::NE)).unwrap();
        for _ in 0..40_000 {
            code.emit(Instruction::Nop).unwrap();
        }
        code.resolve(skip).unwrap();
        code.emit(Instruction::Return).unwrap();
        assert!(code.needs_wide_jumps());
    }

    #[test]
    fn scopes_and_catch_compression() {
        let mut pool = ConstantsPool::new();
        let graph = ClassGraph::new();
        let mut code = CodeBuilder::new(&mut pool, &graph, this(), settings(), false);
        code.begin_body();
        let info = LocalDebugInfo {
            name: UnqualifiedName::from_string(String::from("x")).unwrap(),
            descriptor: FieldType::int(),
            signature: None,
        };
        let x = code.new_local(Integer, Some(info)).unwrap();
        code.emit(Instruction::IConst1).unwrap();
        code.emit(Instruction::IStore(x)).unwrap();
        assert_eq!(code.state().local(x), Some(&Integer));
        code.emit(Instruction::Nop).unwrap();
        code.end_scopes(0).unwrap();
        assert_eq!(code.state().local(x), None);
        assert_eq!(code.next_reg(), 0);

        code.new_reg_segment();
        assert_eq!(code.next_reg(), 1);

        code.add_catch(CatchEntry { start: 0, end: 0, handler: 3, catch_type: None });
        code.add_catch(CatchEntry { start: 3, end: 4, handler: 3, catch_type: None });
        code.add_catch(CatchEntry { start: 0, end: 3, handler: 3, catch_type: None });
        code.compress_catch_table();
        assert_eq!(code.catches().len(), 1);
        assert_eq!(code.catches()[0].end, 3);
    }
}
