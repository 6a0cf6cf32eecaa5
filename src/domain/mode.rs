use std::fmt;

use serde::{Deserialize, Serialize};

/// The three stepping modes sharing one step function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Val,
    Test,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Train, Mode::Val, Mode::Test];

    /// Prefix used for every logged key, e.g. `val_loss`.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Val   => "val",
            Mode::Test  => "test",
        }
    }

    /// `{mode}_{name}`
    pub fn key(self, name: &str) -> String {
        format!("{}_{}", self.as_str(), name)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_mode_prefixed() {
        assert_eq!(Mode::Train.key("loss"), "train_loss");
        assert_eq!(Mode::Val.key("iou"), "val_iou");
        assert_eq!(Mode::Test.to_string(), "test");
    }
}
