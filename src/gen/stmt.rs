use super::complexity::complexity;
use super::env::{self, Env, EnvKind};
use super::fold;
use super::items::{CondItem, Item};
use super::method::{MethodGen, Result};
use super::Error;
use crate::jvm::class_file::{modified_utf8_length, MAX_UTF8_LENGTH};
use crate::jvm::code::{CatchEntry, Chain, Instruction, Jump, TypeCode, VType};
use crate::jvm::verifier::VerificationType;
use crate::jvm::{self, BinaryName, InternalErrorKind, RefType};
use crate::tree::{Case, Catch, ConstValue, Expr, ExprKind, Stmt, StmtKind, UnaryOp, VarDecl};

impl<'a, 't> MethodGen<'a, 't> {
    pub(super) fn gen_stats(&mut self, stmts: &'t [Stmt]) -> Result<()> {
        for stmt in stmts {
            self.gen_stat(stmt)?;
        }
        Ok(())
    }

    pub(super) fn gen_stat(&mut self, stmt: &'t Stmt) -> Result<()> {
        self.gen_stat_in(stmt, false)
    }

    /// Generate a statement, if it is reachable
    ///
    /// Unreachable statements produce no code. In a switch, a local declared in unreachable code
    /// still needs its register: a later case may assign and use it.
    fn gen_stat_in(&mut self, stmt: &'t Stmt, in_switch: bool) -> Result<()> {
        if self.code.is_alive() {
            self.code.stat_begin(stmt.line);
            self.gen_stat_kind(stmt)?;
        } else if let (true, StmtKind::LocalVar { var, .. }) = (in_switch, &stmt.kind) {
            self.declare_local(var)?;
        }

        let stack_size = self.code.state().stack_size();
        if self.code.is_alive() && stack_size != 0 {
            let kind = InternalErrorKind::StackNotEmpty(stack_size);
            return Err(jvm::Error::internal(self.code.code_len(), kind).into());
        }
        Ok(())
    }

    fn gen_stat_kind(&mut self, stmt: &'t Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Empty => Ok(()),
            StmtKind::Block { stmts } => {
                let limit = self.code.next_reg();
                self.gen_stats(stmts)?;
                self.code.end_scopes(limit)?;
                Ok(())
            }
            StmtKind::LocalVar { var, init } => self.gen_local_var(var, init.as_ref()),
            StmtKind::Expr { expr } => self.gen_expr_stat(expr),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let limit = self.code.next_reg();
                let mut cond = self.gen_cond(cond)?;
                let else_chain = cond.jump_false(&mut self.code)?;
                let mut then_exit = None;
                if !cond.is_false() {
                    self.code.resolve(cond.true_jumps.take())?;
                    self.gen_stat(then)?;
                    then_exit = self.code.branch(Jump::Goto)?;
                }
                if else_chain.is_some() {
                    self.code.resolve(else_chain)?;
                    if let Some(otherwise) = otherwise {
                        self.gen_stat(otherwise)?;
                    }
                }
                self.code.resolve(then_exit)?;
                self.code.end_scopes(limit)?;
                Ok(())
            }
            StmtKind::While { cond, body } => self.gen_loop(body, Some(cond), &[], true),
            StmtKind::DoWhile { body, cond } => self.gen_loop(body, Some(cond), &[], false),
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let limit = self.code.next_reg();
                self.gen_stats(init)?;
                self.gen_loop(body, cond.as_ref(), update, true)?;
                self.code.end_scopes(limit)?;
                Ok(())
            }
            StmtKind::Labelled { label, body } => {
                self.envs.push(Env::new(EnvKind::Labelled(label)));
                self.gen_stat(body)?;
                self.pop_env_resolving_exit()
            }
            StmtKind::Switch { selector, cases } => self.gen_switch(selector, cases),
            StmtKind::Break { label } => {
                let target = env::break_target(&self.envs, label.as_deref())?;
                self.unwind_preserving_line(target)?;
                let jump = self.code.branch(Jump::Goto)?;
                let exit = self.envs[target].exit.take();
                self.envs[target].exit = self.code.merge_chains(exit, jump)?;
                self.end_finalizer_gaps(target)
            }
            StmtKind::Continue { label } => {
                let target = env::continue_target(&self.envs, label.as_deref())?;
                self.unwind_preserving_line(target)?;
                let jump = self.code.branch(Jump::Goto)?;
                let cont = self.envs[target].cont.take();
                self.envs[target].cont = self.code.merge_chains(cont, jump)?;
                self.end_finalizer_gaps(target)
            }
            StmtKind::Return { value } => self.gen_return(value.as_ref()),
            StmtKind::Throw { value } => {
                self.gen_item(value)?.load(&mut self.code)?;
                self.code.emit(Instruction::AThrow)?;
                Ok(())
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                if let (Some(finally), false) = (finally, self.use_jsr) {
                    let limit = self.settings.finalizer_inline_limit;
                    self.use_jsr = self.settings.use_subroutine(complexity(finally, limit));
                    if self.use_jsr {
                        log::debug!("compiling finally block as a subroutine");
                    }
                }
                self.envs.push(Env::new(EnvKind::Try {
                    finalizer: finally.as_deref(),
                    jsr: self.use_jsr,
                }));
                let idx = self.envs.len() - 1;
                self.gen_try(body, catches, idx, true)?;
                self.envs.pop();
                Ok(())
            }
            StmtKind::Synchronized { lock, body } => {
                let limit = self.code.next_reg();
                let lock_reg = self.make_temp(VerificationType::Object(RefType::Object(BinaryName::OBJECT)))?;
                self.gen_expr(lock, TypeCode::Object)?.load(&mut self.code)?;
                self.code.emit(Instruction::Dup)?;
                self.code.emit(Instruction::AStore(lock_reg))?;
                self.code.emit(Instruction::MonitorEnter)?;
                self.code.state_mut().lock(lock_reg);

                self.envs.push(Env::new(EnvKind::Synchronized { lock: lock_reg }));
                let idx = self.envs.len() - 1;
                self.gen_try(body, &[], idx, false)?;
                self.envs.pop();
                self.code.end_scopes(limit)?;
                Ok(())
            }
        }
    }

    fn gen_local_var(&mut self, var: &VarDecl, init: Option<&Expr>) -> Result<()> {
        let reg = self.declare_local(var)?;
        let init = match init {
            Some(init) => init,
            None => return Ok(()),
        };
        if let Some(ConstValue::String(string)) = &var.constant {
            let length = modified_utf8_length(string);
            if length > MAX_UTF8_LENGTH {
                return Err(jvm::Error::StringTooLong { length }.into());
            }
        }
        // Constant locals are inlined at every use, so the store only matters to a debugger
        if var.constant.is_none() || self.settings.local_variables {
            let typecode = TypeCode::of(&var.ty);
            self.gen_expr(init, typecode)?.load(&mut self.code)?;
            Item::Local { typecode, reg }.store(&mut self.code)?;
        }
        Ok(())
    }

    /// Evaluate an expression for its side effects only
    fn gen_expr_stat(&mut self, expr: &Expr) -> Result<()> {
        let item = match &expr.kind {
            // The old value isn't needed, so the cheaper pre-increment does
            ExprKind::Unary {
                op: op @ (UnaryOp::PostInc | UnaryOp::PostDec),
                operand,
            } if fold::constant_of(expr).is_none() => {
                let pre = if *op == UnaryOp::PostInc {
                    UnaryOp::PreInc
                } else {
                    UnaryOp::PreDec
                };
                self.gen_unary(expr, pre, operand)?
            }
            _ => self.gen_item(expr)?,
        };
        item.drop(&mut self.code)
    }

    /// Generate a loop, with its condition tested either before or after the body
    fn gen_loop(&mut self, body: &'t Stmt, cond: Option<&Expr>, updates: &[Expr], test_first: bool) -> Result<()> {
        self.envs.push(Env::new(EnvKind::Loop));
        let start = self.code.entry_point()?;
        let idx = self.envs.len() - 1;
        if test_first {
            let mut cond = match cond {
                Some(cond) => self.gen_cond(cond)?,
                None => CondItem::new(Jump::Goto),
            };
            let done = cond.jump_false(&mut self.code)?;
            self.code.resolve(cond.true_jumps.take())?;
            self.gen_stat(body)?;
            let cont = self.envs[idx].cont.take();
            self.code.resolve(cont)?;
            for update in updates {
                if self.code.is_alive() {
                    self.gen_expr_stat(update)?;
                }
            }
            let back = self.code.branch(Jump::Goto)?;
            self.code.resolve_to(back, start)?;
            self.code.resolve(done)?;
        } else {
            self.gen_stat(body)?;
            let cont = self.envs[idx].cont.take();
            self.code.resolve(cont)?;
            if self.code.is_alive() {
                let mut cond = match cond {
                    Some(cond) => self.gen_cond(cond)?,
                    None => CondItem::new(Jump::Goto),
                };
                let back = cond.jump_true(&mut self.code)?;
                self.code.resolve_to(back, start)?;
                self.code.resolve(cond.false_jumps.take())?;
            }
        }
        self.pop_env_resolving_exit()
    }

    /// Leave the innermost statement, continuing with the `break`s out of it
    fn pop_env_resolving_exit(&mut self) -> Result<()> {
        let exit = self.envs.pop().and_then(|env| env.exit);
        let next_reg = self.code.next_reg();
        self.code.resolve(exit.map(|chain| chain.undefine_from(next_reg)))?;
        Ok(())
    }

    fn gen_switch(&mut self, selector: &Expr, cases: &'t [Case]) -> Result<()> {
        let limit = self.code.next_reg();
        let selector = self.gen_expr(selector, TypeCode::Int)?.load(&mut self.code)?;
        if cases.is_empty() {
            selector.drop(&mut self.code)?;
            self.code.end_scopes(limit)?;
            return Ok(());
        }

        let labels: Vec<i32> = cases.iter().flat_map(|case| case.labels.iter().copied()).collect();
        let (lo, hi) = match (labels.iter().min(), labels.iter().max()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => (0, -1),
        };
        let nlabels = labels.len() as i64;
        let table_space_cost = 4 + (hi as i64 - lo as i64 + 1);
        let table_time_cost = 3;
        let lookup_space_cost = 3 + 2 * nlabels;
        let lookup_time_cost = nlabels;
        let table = nlabels > 0
            && table_space_cost + 3 * table_time_cost <= lookup_space_cost + 3 * lookup_time_cost;
        log::debug!(
            "{} with {} labels in [{}, {}]",
            if table { "tableswitch" } else { "lookupswitch" },
            nlabels,
            lo,
            hi
        );

        let start = match self.code.emit_switch(table)? {
            Some(start) => start,
            None => return Ok(()),
        };
        self.code.align(4);
        let table_base = self.code.code_len();
        self.code.emit4(-1);
        if table {
            self.code.emit4(lo);
            self.code.emit4(hi);
            for _ in lo as i64..=hi as i64 {
                self.code.emit4(-1);
            }
        } else {
            self.code.emit4(labels.len() as i32);
            for _ in &labels {
                self.code.emit4(-1);
                self.code.emit4(-1);
            }
        }
        let state_switch = self.code.state().clone();
        self.code.mark_dead();

        self.envs.push(Env::new(EnvKind::Switch));
        let mut lookup: Vec<(i32, i32)> = vec![];
        for case in cases {
            let pc = self.code.entry_point_with(&state_switch, None)?;
            let offset = switch_offset(start, pc)?;
            for &label in &case.labels {
                if table {
                    let slot = table_base + 4 * ((label as i64 - lo as i64) as usize + 3);
                    self.code.put4(slot, offset);
                } else {
                    lookup.push((label, offset));
                }
            }
            if case.is_default {
                self.code.put4(table_base, offset);
            }
            for stmt in &case.body {
                self.gen_stat_in(stmt, true)?;
            }
        }
        let exit = self.envs.pop().and_then(|env| env.exit);
        self.code.resolve(exit.map(|chain| chain.undefine_from(limit)))?;

        // Without a default case, unmatched values skip the switch
        if self.code.get4(table_base) == -1 {
            let pc = self.code.entry_point_with(&state_switch, None)?;
            self.code.put4(table_base, switch_offset(start, pc)?);
        }
        let default_offset = self.code.get4(table_base);
        if table {
            for slot in 0..(hi as i64 - lo as i64 + 1) as usize {
                let at = table_base + 4 * (slot + 3);
                if self.code.get4(at) == -1 {
                    self.code.put4(at, default_offset);
                }
            }
        } else {
            lookup.sort_by_key(|&(label, _)| label);
            for (i, (label, offset)) in lookup.into_iter().enumerate() {
                let at = table_base + 8 * (i + 1);
                self.code.put4(at, label);
                self.code.put4(at + 4, offset);
            }
        }
        self.code.end_scopes(limit)?;
        Ok(())
    }

    fn gen_return(&mut self, value: Option<&Expr>) -> Result<()> {
        let limit = self.code.next_reg();
        let saved_line = self.code.pending_line();
        match value {
            Some(value) => {
                let typecode = self.return_typecode;
                let mut result = self.gen_expr(value, typecode)?.load(&mut self.code)?;
                if env::has_finalizer(&self.envs) {
                    let temp = self.make_temp(return_vtype(typecode, value))?;
                    result = Item::Local { typecode, reg: temp };
                    result.clone().store(&mut self.code)?;
                }
                self.unwind(0)?;
                self.restore_line(saved_line);
                result.load(&mut self.code)?;
                self.code.emit(Instruction::return_value(typecode))?;
            }
            None => {
                self.unwind(0)?;
                self.restore_line(saved_line);
                self.code.emit(Instruction::Return)?;
            }
        }
        self.end_finalizer_gaps(0)?;
        self.code.end_scopes(limit)?;
        Ok(())
    }

    fn restore_line(&mut self, line: Option<u16>) {
        match line {
            Some(_) => self.code.stat_begin(line),
            None => self.code.clear_pending_line(),
        }
    }

    /// Run the finalizers of every statement from the innermost one out to `target`
    fn unwind(&mut self, target: usize) -> Result<()> {
        for idx in (target..self.envs.len()).rev() {
            self.gen_finalizer(idx)?;
        }
        Ok(())
    }

    /// Unwind for a `break` or `continue`, keeping the line of the jump itself
    fn unwind_preserving_line(&mut self, target: usize) -> Result<()> {
        let saved_line = self.code.pending_line();
        self.unwind(target)?;
        self.restore_line(saved_line);
        Ok(())
    }

    /// Emit the code needed to leave the statement at `idx` (a copy of the `finally` block, a
    /// `jsr` to it, or releasing a monitor), opening a gap in its exception ranges
    fn gen_finalizer(&mut self, idx: usize) -> Result<()> {
        if !self.code.is_alive() {
            return Ok(());
        }
        match self.envs[idx].kind {
            EnvKind::Try {
                finalizer,
                jsr: true,
            } => {
                if finalizer.is_some() {
                    let site = self.code.jsr()?;
                    let sites = self.envs[idx].jsr_sites.take();
                    self.envs[idx].jsr_sites = self.code.merge_chains(sites, site)?;
                }
                let pc = self.code.cur_pc()?;
                self.envs[idx].gaps.push(pc);
            }
            EnvKind::Try {
                finalizer,
                jsr: false,
            } => {
                let pc = self.code.cur_pc()?;
                self.envs[idx].gaps.push(pc);
                if let Some(finalizer) = finalizer {
                    self.gen_in_outer_envs(idx, finalizer)?;
                }
            }
            EnvKind::Synchronized { lock } => {
                self.release_monitor(lock)?;
                let pc = self.code.cur_pc()?;
                self.envs[idx].gaps.push(pc);
            }
            EnvKind::Loop | EnvKind::Switch | EnvKind::Labelled(_) => (),
        }
        Ok(())
    }

    /// Generate a statement as if it appeared outside of the statement at `idx`
    fn gen_in_outer_envs(&mut self, idx: usize, stmt: &'t Stmt) -> Result<()> {
        let inner = self.envs.split_off(idx);
        let result = self.gen_stat(stmt);
        self.envs.extend(inner);
        result
    }

    fn release_monitor(&mut self, lock: u16) -> Result<()> {
        if self.code.is_alive() {
            self.code.emit(Instruction::ALoad(lock))?;
            self.code.emit(Instruction::MonitorExit)?;
            let pc = self.code.code_len();
            self.code
                .state_mut()
                .unlock(lock)
                .map_err(|kind| jvm::Error::internal(pc, kind))?;
        }
        Ok(())
    }

    /// Close the open finalizer gap of the statement at `idx`, if any
    fn end_finalizer_gap(&mut self, idx: usize) -> Result<()> {
        if self.envs[idx].in_gap() {
            let pc = self.code.cur_pc()?;
            self.envs[idx].gaps.push(pc);
        }
        Ok(())
    }

    fn end_finalizer_gaps(&mut self, target: usize) -> Result<()> {
        for idx in (target..self.envs.len()).rev() {
            self.end_finalizer_gap(idx)?;
        }
        Ok(())
    }

    /// Body, handlers, and catch-all of a `try` or `synchronized` statement at `idx`
    fn gen_try(&mut self, body: &'t Stmt, catches: &'t [Catch], idx: usize, actual_try: bool) -> Result<()> {
        let limit = self.code.next_reg();
        let start = self.code.cur_pc()?;
        let state_try = self.code.state().clone();
        self.gen_stat(body)?;
        let end = self.code.cur_pc()?;
        let body_gaps = self.envs[idx].gaps.clone();

        match self.envs[idx].kind {
            // Nothing is protected, so no subroutine gets placed: run the `finally` block in line
            EnvKind::Try {
                finalizer: Some(finalizer),
                jsr: true,
            } if start == end && actual_try => {
                if self.code.is_alive() {
                    self.gen_in_outer_envs(idx, finalizer)?;
                }
            }
            _ => self.gen_finalizer(idx)?,
        }
        let exit_jump = if start == end && actual_try {
            Jump::Never
        } else {
            Jump::Goto
        };
        let mut exit = self.code.branch(exit_jump)?;
        self.end_finalizer_gap(idx)?;

        let has_finalizer = self.envs[idx].has_finalizer();
        if start != end {
            for (i, catch) in catches.iter().enumerate() {
                let caught = VType::from(catch.param.ty.clone());
                self.code.entry_point_with(&state_try, Some(caught))?;
                self.gen_catch(catch, start, end, &body_gaps)?;
                self.gen_finalizer(idx)?;
                if has_finalizer || i + 1 < catches.len() {
                    let jump = self.code.branch(Jump::Goto)?;
                    exit = self.code.merge_chains(exit, jump)?;
                }
                self.end_finalizer_gap(idx)?;
            }
        }

        if has_finalizer && (start != end || !actual_try) {
            self.code.new_reg_segment();
            let throwable = VerificationType::Object(RefType::Object(BinaryName::THROWABLE));
            let catch_all = self.code.entry_point_with(&state_try, Some(throwable.clone()))?;
            let gaps = std::mem::take(&mut self.envs[idx].gaps);
            let mut segment_start = start;
            for pair in gaps.chunks(2) {
                self.register_catch(segment_start, pair[0], catch_all, None)?;
                segment_start = pair.get(1).copied().unwrap_or(pair[0]);
            }

            if let EnvKind::Try {
                finalizer: Some(finalizer),
                ..
            } = self.envs[idx].kind
            {
                self.code.stat_begin(finalizer.line);
            }
            self.code.mark_stat_begin();
            let exception = self.make_temp(throwable)?;
            self.code.emit(Instruction::AStore(exception))?;
            self.gen_finalizer(idx)?;
            self.code.resolve_pending()?;
            let segment_end = match self.envs[idx].gaps.first() {
                Some(&pc) => pc,
                None => self.code.cur_pc()?,
            };
            self.code.emit(Instruction::ALoad(exception))?;
            self.register_catch(segment_start, segment_end, catch_all, None)?;
            self.code.emit(Instruction::AThrow)?;

            let jsr_sites = self.envs[idx].jsr_sites.take();
            if let (Some(sites), EnvKind::Try { finalizer: Some(finalizer), .. }) =
                (jsr_sites, self.envs[idx].kind)
            {
                self.gen_subroutine(idx, sites, finalizer)?;
            }
        }

        self.code.resolve(exit)?;
        self.code.end_scopes(limit)?;
        Ok(())
    }

    /// Place the `finally` block once, as the target of every `jsr` to it
    fn gen_subroutine(&mut self, idx: usize, sites: Chain, finalizer: &'t Stmt) -> Result<()> {
        self.code.resolve(Some(sites))?;
        self.code.stat_begin(finalizer.line);
        self.code.mark_stat_begin();
        let return_address = self.make_temp(VerificationType::ReturnAddress)?;
        self.code.emit(Instruction::AStore(return_address))?;
        self.gen_in_outer_envs(idx, finalizer)?;
        self.code.emit(Instruction::Ret(return_address))?;
        Ok(())
    }

    /// Handler of one `catch` clause, covering the body except for the finalizer gaps in it
    fn gen_catch(&mut self, catch: &'t Catch, start: usize, end: usize, gaps: &[usize]) -> Result<()> {
        let handler = self.code.cur_pc()?;
        let mut segment_start = start;
        for pair in gaps.chunks(2) {
            for class in &catch.types {
                self.register_catch(segment_start, pair[0], handler, Some(class))?;
            }
            segment_start = pair.get(1).copied().unwrap_or(end);
        }
        if segment_start < end {
            for class in &catch.types {
                self.register_catch(segment_start, end, handler, Some(class))?;
            }
        }

        self.code.stat_begin(catch.body.line);
        self.code.mark_stat_begin();
        let limit = self.code.next_reg();
        self.declare_local(&catch.param)?;
        self.local_item(catch.param.id)?.store(&mut self.code)?;
        self.gen_stat(&catch.body)?;
        self.code.end_scopes(limit)?;
        Ok(())
    }

    /// Add an exception table entry, unless the range is empty
    fn register_catch(&mut self, start: usize, end: usize, handler: usize, class: Option<&BinaryName>) -> Result<()> {
        if start == end {
            return Ok(());
        }
        let too_large = || jvm::Error::TryRangeTooLarge { start, end };
        let entry = CatchEntry {
            start: u16::try_from(start).map_err(|_| too_large())?,
            end: u16::try_from(end).map_err(|_| too_large())?,
            handler: u16::try_from(handler).map_err(|_| too_large())?,
            catch_type: class.cloned(),
        };
        self.code.add_catch(entry);
        Ok(())
    }
}

/// Offset of a case from the switch instruction
fn switch_offset(start: usize, pc: usize) -> Result<i32> {
    i32::try_from(pc - start).map_err(|_| Error::from(jvm::Error::CodeTooLarge(pc)))
}

/// Verification type of the temporary holding a return value across finalizers
fn return_vtype(typecode: TypeCode, value: &Expr) -> VType {
    match (typecode, &value.ty) {
        (TypeCode::Object, Some(ty)) => VType::from(ty.clone()),
        (TypeCode::Object, None) => VerificationType::Object(RefType::Object(BinaryName::OBJECT)),
        (TypeCode::Long, _) => VerificationType::Long,
        (TypeCode::Float, _) => VerificationType::Float,
        (TypeCode::Double, _) => VerificationType::Double,
        _ => VerificationType::Integer,
    }
}
