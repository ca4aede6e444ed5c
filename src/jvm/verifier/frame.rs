use super::VerificationType;
use crate::jvm::class_file::{ClassConstantIndex, StackMapFrame};
use crate::util::OffsetVec;
use std::io::{Error, ErrorKind, Result};

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Locals are stored the way stack map frames store them: a `long` or `double` local is a single
/// entry covering two slots, and unusable slots are `Top`.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame<Cls, U> {
    /// Local variables in scope
    pub locals: OffsetVec<VerificationType<Cls, U>>,

    /// Types of values on the stack
    pub stack: OffsetVec<VerificationType<Cls, U>>,
}

/// Frame as it appears in a class file
pub type ClassFileFrame = Frame<ClassConstantIndex, u16>;

impl<Cls, U> Frame<Cls, U> {
    pub fn new(
        locals: OffsetVec<VerificationType<Cls, U>>,
        stack: OffsetVec<VerificationType<Cls, U>>,
    ) -> Frame<Cls, U> {
        Frame { locals, stack }
    }
}

impl ClassFileFrame {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none
    /// of the other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        match self.stack.len() {
            0 => {
                let this_locals_len = self.locals.len();
                let prev_locals_len = previous_frame.locals.len();

                if this_locals_len <= prev_locals_len {
                    let len_difference = prev_locals_len - this_locals_len;
                    if len_difference < 4 {
                        let this_is_prefix_of_prev = self
                            .locals
                            .values()
                            .zip(previous_frame.locals.values())
                            .all(|(t1, t2)| t1 == t2);

                        if this_is_prefix_of_prev {
                            if len_difference == 0 {
                                return StackMapFrame::SameLocalsNoStack { offset_delta };
                            } else {
                                return StackMapFrame::ChopLocalsNoStack {
                                    offset_delta,
                                    chopped_k: len_difference as u8,
                                };
                            }
                        }
                    }
                } else if this_locals_len - prev_locals_len < 4 {
                    let prev_is_prefix_of_this = previous_frame
                        .locals
                        .values()
                        .zip(self.locals.values())
                        .all(|(t1, t2)| t1 == t2);

                    if prev_is_prefix_of_this {
                        return StackMapFrame::AppendLocalsNoStack {
                            offset_delta,
                            locals: self.locals.values().skip(prev_locals_len).cloned().collect(),
                        };
                    }
                }
            }
            1 if self.locals == previous_frame.locals => {
                if let Some(stack) = self.stack.last() {
                    return StackMapFrame::SameLocalsOneStack {
                        offset_delta,
                        stack: stack.clone(),
                    };
                }
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack.values().cloned().collect(),
            locals: self.locals.values().cloned().collect(),
        }
    }

    /// Reconstruct the frame described by `frame`, relative to this (previous) frame
    ///
    /// This is the inverse of [`Self::stack_map_frame`].
    pub fn apply(&self, frame: &StackMapFrame) -> Result<ClassFileFrame> {
        Ok(match frame {
            StackMapFrame::SameLocalsNoStack { .. } => {
                Frame::new(self.locals.clone(), OffsetVec::new())
            }
            StackMapFrame::SameLocalsOneStack { stack, .. } => {
                Frame::new(self.locals.clone(), OffsetVec::from([stack.clone()]))
            }
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let chopped_k = *chopped_k as usize;
                let kept = match self.locals.len().checked_sub(chopped_k) {
                    Some(kept) => kept,
                    None => {
                        let msg = format!(
                            "cannot chop {} locals from a frame with {}",
                            chopped_k,
                            self.locals.len()
                        );
                        return Err(Error::new(ErrorKind::InvalidData, msg));
                    }
                };
                let locals = self.locals.values().take(kept).cloned().collect();
                Frame::new(locals, OffsetVec::new())
            }
            StackMapFrame::AppendLocalsNoStack { locals, .. } => {
                let mut all_locals = self.locals.clone();
                all_locals.extend(locals.iter().cloned());
                Frame::new(all_locals, OffsetVec::new())
            }
            StackMapFrame::Full { locals, stack, .. } => Frame::new(
                locals.iter().cloned().collect(),
                stack.iter().cloned().collect(),
            ),
        })
    }

    /// Decompress a whole stack map table, starting from the method's implicit initial frame
    ///
    /// Returns the code offset of every frame alongside the frame itself.
    pub fn decompress_table(
        initial: &ClassFileFrame,
        table: &[StackMapFrame],
    ) -> Result<Vec<(usize, ClassFileFrame)>> {
        let mut frames: Vec<(usize, ClassFileFrame)> = vec![];
        for compressed in table {
            let (offset, frame) = match frames.last() {
                None => (
                    compressed.offset_delta() as usize,
                    initial.apply(compressed)?,
                ),
                Some((previous_offset, previous)) => (
                    previous_offset + compressed.offset_delta() as usize + 1,
                    previous.apply(compressed)?,
                ),
            };
            frames.push((offset, frame));
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantIndex;
    use VerificationType::*;

    fn frame<const N: usize, const M: usize>(
        locals: [VerificationType<ClassConstantIndex, u16>; N],
        stack: [VerificationType<ClassConstantIndex, u16>; M],
    ) -> ClassFileFrame {
        Frame::new(OffsetVec::from(locals), OffsetVec::from(stack))
    }

    fn object(idx: u16) -> VerificationType<ClassConstantIndex, u16> {
        Object(ClassConstantIndex(ConstantIndex(idx)))
    }

    fn assert_lossless(prev: &ClassFileFrame, next: &ClassFileFrame) -> StackMapFrame {
        let compressed = next.stack_map_frame(3, prev);
        assert_eq!(&prev.apply(&compressed).unwrap(), next, "via {:?}", compressed);
        compressed
    }

    #[test]
    fn same_frames() {
        let prev = frame([object(2), Integer], []);
        let same = assert_lossless(&prev, &frame([object(2), Integer], []));
        assert_eq!(same, StackMapFrame::SameLocalsNoStack { offset_delta: 3 });

        let one = assert_lossless(&prev, &frame([object(2), Integer], [Long]));
        assert_eq!(
            one,
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 3,
                stack: Long
            }
        );
    }

    #[test]
    fn chop_and_append() {
        let prev = frame([object(2), Long, Integer, Float], []);
        let chopped = assert_lossless(&prev, &frame([object(2)], []));
        assert_eq!(
            chopped,
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 3,
                chopped_k: 3
            }
        );

        let appended = assert_lossless(&prev, &frame([object(2), Long, Integer, Float, Top], []));
        assert!(matches!(appended, StackMapFrame::AppendLocalsNoStack { ref locals, .. } if locals.len() == 1));
    }

    #[test]
    fn full_fallbacks() {
        let prev = frame([object(2), Long, Integer, Float, Double], []);

        // chopping four locals is too many
        let chop4 = assert_lossless(&prev, &frame([object(2)], []));
        assert!(matches!(chop4, StackMapFrame::Full { .. }));

        // differing prefix
        let diff = assert_lossless(&prev, &frame([object(3)], []));
        assert!(matches!(diff, StackMapFrame::Full { .. }));

        // stack with new locals
        let both = assert_lossless(&prev, &frame([object(2), Integer], [Null]));
        assert!(matches!(both, StackMapFrame::Full { .. }));

        // two stack entries
        let deep = assert_lossless(&frame([], []), &frame([], [Integer, Integer]));
        assert!(matches!(deep, StackMapFrame::Full { .. }));
    }

    #[test]
    fn table_offsets() {
        let initial = frame([object(2)], []);
        let table = vec![
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 4,
                locals: vec![Integer],
            },
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 2,
                stack: object(5),
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 0,
                chopped_k: 1,
            },
        ];
        let frames = ClassFileFrame::decompress_table(&initial, &table).unwrap();
        let offsets: Vec<usize> = frames.iter().map(|(off, _)| *off).collect();
        assert_eq!(offsets, vec![4, 7, 8]);
        assert_eq!(frames[1].1, frame([object(2), Integer], [object(5)]));
        assert_eq!(frames[2].1, initial);

        let bad = StackMapFrame::ChopLocalsNoStack {
            offset_delta: 0,
            chopped_k: 2,
        };
        assert!(initial.apply(&bad).is_err());
    }
}
