use super::Error;
use crate::jvm::code::Chain;
use crate::tree::Stmt;

/// Kind of statement that non-local exits have to know about
#[derive(Clone, Copy, Debug)]
pub enum EnvKind<'t> {
    Loop,
    Switch,
    Labelled(&'t str),

    /// `try`, with the `finally` block (if any) and how it is compiled
    Try {
        finalizer: Option<&'t Stmt>,
        jsr: bool,
    },

    /// `synchronized`, with the register holding the lock
    Synchronized { lock: u16 },
}

/// Enclosing statement, as seen from the statements nested in it
///
/// Jumps out of the statement collect in `exit` and `cont` until the statement is done. Every
/// copy of a finalizer emitted for an exit is recorded in `gaps` as a pair of offsets: the code
/// in between must not be covered by the catch-all handler of the same `try`.
#[derive(Debug)]
pub struct Env<'t> {
    pub kind: EnvKind<'t>,

    /// Jumps to the end of the statement (`break`)
    pub exit: Option<Chain>,

    /// Jumps to the next iteration (`continue`)
    pub cont: Option<Chain>,

    /// Alternating start and end offsets of finalizer copies
    pub gaps: Vec<usize>,

    /// `jsr` instructions calling the finalizer subroutine
    pub jsr_sites: Option<Chain>,
}

impl<'t> Env<'t> {
    pub fn new(kind: EnvKind<'t>) -> Env<'t> {
        Env {
            kind,
            exit: None,
            cont: None,
            gaps: vec![],
            jsr_sites: None,
        }
    }

    /// Does leaving this statement require running some code?
    pub fn has_finalizer(&self) -> bool {
        matches!(
            self.kind,
            EnvKind::Try {
                finalizer: Some(_),
                ..
            } | EnvKind::Synchronized { .. }
        )
    }

    /// Is a finalizer copy open (started but not yet ended)?
    pub fn in_gap(&self) -> bool {
        self.gaps.len() % 2 == 1
    }
}

/// Index of the statement a `break` leaves
pub fn break_target(envs: &[Env], label: Option<&str>) -> Result<usize, Error> {
    let found = envs.iter().rposition(|env| match (label, env.kind) {
        (None, EnvKind::Loop | EnvKind::Switch) => true,
        (Some(label), EnvKind::Labelled(name)) => label == name,
        _ => false,
    });
    found.ok_or_else(|| match label {
        Some(label) => Error::malformed(format!("break to unknown label `{}`", label)),
        None => Error::malformed("break outside of loop or switch"),
    })
}

/// Index of the loop a `continue` goes to the next iteration of
///
/// A labelled `continue` names the labelled statement, but the jump belongs to the loop that
/// statement wraps.
pub fn continue_target(envs: &[Env], label: Option<&str>) -> Result<usize, Error> {
    let found = match label {
        None => envs.iter().rposition(|env| matches!(env.kind, EnvKind::Loop)),
        Some(label) => envs
            .iter()
            .rposition(|env| matches!(env.kind, EnvKind::Labelled(name) if name == label))
            .and_then(|labelled| {
                envs[labelled + 1..]
                    .iter()
                    .position(|env| matches!(env.kind, EnvKind::Loop))
                    .map(|offset| labelled + 1 + offset)
            }),
    };
    found.ok_or_else(|| match label {
        Some(label) => Error::malformed(format!("continue to non-loop label `{}`", label)),
        None => Error::malformed("continue outside of loop"),
    })
}

/// Does leaving any of these statements require running some code?
pub fn has_finalizer(envs: &[Env]) -> bool {
    envs.iter().any(Env::has_finalizer)
}

#[cfg(test)]
mod test {
    use super::*;

    fn envs(kinds: Vec<EnvKind<'static>>) -> Vec<Env<'static>> {
        kinds.into_iter().map(Env::new).collect()
    }

    #[test]
    fn break_finds_innermost_target() {
        let stack = envs(vec![
            EnvKind::Labelled("outer"),
            EnvKind::Loop,
            EnvKind::Switch,
            EnvKind::Try {
                finalizer: None,
                jsr: false,
            },
        ]);
        assert_eq!(break_target(&stack, None).unwrap(), 2);
        assert_eq!(break_target(&stack, Some("outer")).unwrap(), 0);
        assert!(break_target(&stack, Some("missing")).is_err());
        assert!(break_target(&stack[..1], None).is_err());
    }

    #[test]
    fn continue_skips_switches() {
        let stack = envs(vec![
            EnvKind::Labelled("outer"),
            EnvKind::Loop,
            EnvKind::Labelled("inner"),
            EnvKind::Loop,
            EnvKind::Switch,
        ]);
        assert_eq!(continue_target(&stack, None).unwrap(), 3);
        assert_eq!(continue_target(&stack, Some("outer")).unwrap(), 1);
        assert_eq!(continue_target(&stack, Some("inner")).unwrap(), 3);

        let not_a_loop = envs(vec![EnvKind::Labelled("block"), EnvKind::Switch]);
        assert!(continue_target(&not_a_loop, Some("block")).is_err());
    }

    #[test]
    fn finalizers() {
        let sync = Env::new(EnvKind::Synchronized { lock: 3 });
        assert!(sync.has_finalizer());
        let mut plain = Env::new(EnvKind::Try {
            finalizer: None,
            jsr: false,
        });
        assert!(!plain.has_finalizer());
        plain.gaps.push(4);
        assert!(plain.in_gap());
        assert!(!has_finalizer(&[plain]));
        assert!(has_finalizer(&[Env::new(EnvKind::Loop), sync]));
    }
}
