//! Plain, serde-derived configuration types describing the static chain topology. This crate
//! never parses these from a wire or file format; a host assembles them and hands the tree to
//! [`crate::chain::ChainBuilder`].

use serde::{Deserialize, Serialize};

use crate::record::ErasedRecord;

/// A static edge in the streaming topology: one producer operator feeding one consumer, either
/// chained (in-process) or non-chained (across a network writer). `output_tag_id` is `None` for
/// the main stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEdge {
    pub source_operator_id: String,
    pub target_operator_id: String,
    pub output_tag_id: Option<String>,
    /// Name consulted by a [`crate::chain::OutputSelector`] when the producer has one or more
    /// selectors configured; unused on edges belonging to a producer with no selectors.
    pub selected_name: Option<String>,
}

impl StreamEdge {
    pub fn new(source_operator_id: impl Into<String>, target_operator_id: impl Into<String>) -> Self {
        Self {
            source_operator_id: source_operator_id.into(),
            target_operator_id: target_operator_id.into(),
            output_tag_id: None,
            selected_name: None,
        }
    }

    pub fn with_output_tag(mut self, tag_id: impl Into<String>) -> Self {
        self.output_tag_id = Some(tag_id.into());
        self
    }

    pub fn with_selected_name(mut self, name: impl Into<String>) -> Self {
        self.selected_name = Some(name.into());
        self
    }

    pub fn is_side_output(&self) -> bool {
        self.output_tag_id.is_some()
    }
}

/// Per-operator static configuration: which edges are chained (built as an in-process sink by the
/// builder) versus non-chained (already bound to a network writer and handed in positionally).
///
/// Output selectors and the task-wide object-reuse flag are deliberately not carried here: the
/// former are boxed trait objects a plain, `serde`-derived config tree can't hold, and the latter
/// is a single value for the whole task (§3's invariant), not per-operator config — both are
/// sourced at build time from the [`crate::chain::OperatorFactory`] and
/// [`crate::chain::ContainingTask`] respectively (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub operator_id: String,
    pub chained_outputs: Vec<StreamEdge>,
    pub non_chained_outputs: Vec<StreamEdge>,
    /// Recursive configuration for each chained out-edge's target, keyed by target operator id.
    pub chained_configs: Vec<(String, StreamConfig)>,
}

impl StreamConfig {
    pub fn new(operator_id: impl Into<String>) -> Self {
        Self {
            operator_id: operator_id.into(),
            chained_outputs: Vec::new(),
            non_chained_outputs: Vec::new(),
            chained_configs: Vec::new(),
        }
    }

    pub fn chained_config_for(&self, target_operator_id: &str) -> Option<&StreamConfig> {
        self.chained_configs
            .iter()
            .find(|(id, _)| id == target_operator_id)
            .map(|(_, config)| config)
    }
}

/// A user-supplied mapping from a record to zero or more named output streams, consulted by the
/// chain builder via [`crate::chain::OperatorFactory::output_selectors`] for each producer.
/// Evaluated in declaration order (§4.4); a [`crate::output::directed::DirectedOutput`] dedupes
/// the selected sinks once per `collect` call.
pub trait OutputSelector: Send {
    fn select(&self, record: &ErasedRecord) -> Vec<String>;
}

/// A bitmask over 1-based input ids, tracking which inputs of a (possibly two-input) head
/// operator have reported end-of-input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputSelection(u64);

impl InputSelection {
    pub const ALL: InputSelection = InputSelection(u64::MAX);

    pub fn none() -> Self {
        Self(0)
    }

    pub fn with(mut self, input_id: usize) -> Self {
        self.0 |= Self::bit(input_id);
        self
    }

    pub fn contains(&self, input_id: usize) -> bool {
        self.0 & Self::bit(input_id) != 0
    }

    /// Whether this mask already accounts for every one of `total_inputs` (1-based) ids.
    pub fn is_all_selected(&self, total_inputs: usize) -> bool {
        if total_inputs == 0 {
            return true;
        }
        let full = (1..=total_inputs).fold(0u64, |acc, id| acc | Self::bit(id));
        self.0 & full == full
    }

    fn bit(input_id: usize) -> u64 {
        debug_assert!(input_id >= 1, "input ids are 1-based");
        1u64 << (input_id - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_selection_tracks_individual_inputs() {
        let mask = InputSelection::none().with(1);
        assert!(mask.contains(1));
        assert!(!mask.contains(2));
        assert!(!mask.is_all_selected(2));
    }

    #[test]
    fn input_selection_recognizes_all_selected() {
        let mask = InputSelection::none().with(1).with(2);
        assert!(mask.is_all_selected(2));
    }

    #[test]
    fn chained_config_lookup_finds_target() {
        let mut config = StreamConfig::new("head");
        config
            .chained_configs
            .push(("child".to_string(), StreamConfig::new("child")));
        assert!(config.chained_config_for("child").is_some());
        assert!(config.chained_config_for("missing").is_none());
    }
}
