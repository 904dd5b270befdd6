//! The shared chain state all operators act on.
//!
//! The chain driver owns exactly one [`ChainState`]; operators receive a
//! mutable borrow during `propose` and mutate in place. Rollback on
//! rejection is the driver's job: clone the state before proposing, swap
//! the clone back when the move is rejected. Nothing here is thread-safe
//! and nothing needs to be — the proposal engine is strictly sequential.

use crate::parameter::{BoolParameter, RealParameter};
use crate::tree::TimeTree;

/// Index of a real parameter inside [`ChainState`].
pub type ParamId = usize;

/// Index of a boolean parameter inside [`ChainState`].
pub type FlagId = usize;

/// Tree plus free parameters: the full state a proposal may touch.
#[derive(Debug, Clone)]
pub struct ChainState {
    pub tree: TimeTree,
    pub params: Vec<RealParameter>,
    pub flags: Vec<BoolParameter>,
}

impl ChainState {
    pub fn new(tree: TimeTree) -> Self {
        Self {
            tree,
            params: Vec::new(),
            flags: Vec::new(),
        }
    }

    /// Register a real parameter, returning its id.
    pub fn add_param(&mut self, param: RealParameter) -> ParamId {
        self.params.push(param);
        self.params.len() - 1
    }

    /// Register a boolean parameter, returning its id.
    pub fn add_flag(&mut self, flag: BoolParameter) -> FlagId {
        self.flags.push(flag);
        self.flags.len() - 1
    }

    pub fn param(&self, id: ParamId) -> &RealParameter {
        &self.params[id]
    }

    pub fn param_mut(&mut self, id: ParamId) -> &mut RealParameter {
        &mut self.params[id]
    }

    pub fn flag(&self, id: FlagId) -> &BoolParameter {
        &self.flags[id]
    }

    pub fn flag_mut(&mut self, id: FlagId) -> &mut BoolParameter {
        &mut self.flags[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::RealParameter;
    use crate::tree::TimeTree;

    #[test]
    fn clone_is_an_independent_snapshot() {
        let mut state = ChainState::new(TimeTree::new(1.0));
        let id = state.add_param(RealParameter::unbounded("mu", vec![1.0]).unwrap());

        let snapshot = state.clone();
        state.param_mut(id).set_value(0, 9.0);
        state.tree.set_height(0, 5.0);

        assert_eq!(snapshot.param(id).value(0), 1.0);
        assert_eq!(snapshot.tree.height(0), 1.0);
    }
}
