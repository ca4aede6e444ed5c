use super::State;
use crate::jvm::InternalErrorKind;

/// Pending forward jump whose target offset hasn't been patched yet
#[derive(Clone, Debug)]
pub struct JumpSite {
    /// Offset of the jump instruction
    pub pc: usize,

    /// Machine state when the jump is taken (after the jump popped its operands)
    pub state: State,
}

/// Set of jumps to the same (not yet known) destination
///
/// Sites are kept sorted by descending `pc`, so the most recent jump comes first. An empty chain is
/// represented as `None` everywhere, which is why most operations here take `Option<Chain>`.
#[derive(Clone, Debug)]
pub struct Chain {
    sites: Vec<JumpSite>,
}

impl Chain {
    pub fn new(pc: usize, state: State) -> Chain {
        Chain {
            sites: vec![JumpSite { pc, state }],
        }
    }

    /// Jump sites, most recent first
    pub fn sites(&self) -> &[JumpSite] {
        &self.sites
    }

    pub fn into_sites(self) -> Vec<JumpSite> {
        self.sites
    }

    /// State at the most recent jump
    pub fn state(&self) -> &State {
        &self.sites[0].state
    }

    /// Forget registers from `reg` upwards in every site (they are out of scope at the target)
    pub fn undefine_from(mut self, reg: u16) -> Chain {
        for site in &mut self.sites {
            site.state.undefine_from(reg);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Merge two chains into one, keeping the descending order
    ///
    /// All the sites must agree on stack depth and held monitors, since they will all land on the
    /// same instruction.
    pub fn merge(
        chain1: Option<Chain>,
        chain2: Option<Chain>,
    ) -> Result<Option<Chain>, InternalErrorKind> {
        let (chain1, chain2) = match (chain1, chain2) {
            (None, other) | (other, None) => return Ok(other),
            (Some(chain1), Some(chain2)) => (chain1, chain2),
        };

        let (state1, state2) = (chain1.state(), chain2.state());
        if state1.stack_size() != state2.stack_size() || state1.locks != state2.locks {
            return Err(InternalErrorKind::IncompatibleStates(format!(
                "merging jumps at {} and {} with different stack depths or monitors",
                chain1.sites[0].pc, chain2.sites[0].pc
            )));
        }

        let mut sites = Vec::with_capacity(chain1.len() + chain2.len());
        let mut sites1 = chain1.sites.into_iter().peekable();
        let mut sites2 = chain2.sites.into_iter().peekable();
        loop {
            let take_first = match (sites1.peek(), sites2.peek()) {
                (Some(site1), Some(site2)) => site1.pc >= site2.pc,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_first {
                sites1.next()
            } else {
                sites2.next()
            };
            sites.extend(next);
        }
        Ok(Some(Chain { sites }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::verifier::VerificationType;

    fn pcs(chain: &Option<Chain>) -> Vec<usize> {
        chain
            .as_ref()
            .map(|chain| chain.sites().iter().map(|site| site.pc).collect())
            .unwrap_or_default()
    }

    #[test]
    fn merge_keeps_descending_order() {
        let a = Chain::merge(Some(Chain::new(3, State::new())), Some(Chain::new(10, State::new())))
            .unwrap();
        let b = Chain::merge(Some(Chain::new(7, State::new())), None).unwrap();
        let merged = Chain::merge(a, b).unwrap();
        assert_eq!(pcs(&merged), vec![10, 7, 3]);
        assert_eq!(pcs(&Chain::merge(None, None).unwrap()), Vec::<usize>::new());
    }

    #[test]
    fn merge_checks_stack_depth() {
        let mut deeper = State::new();
        deeper.push(VerificationType::Integer);
        let result = Chain::merge(Some(Chain::new(3, State::new())), Some(Chain::new(5, deeper)));
        assert!(matches!(result, Err(InternalErrorKind::IncompatibleStates(_))));
    }
}
