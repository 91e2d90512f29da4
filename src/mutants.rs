use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    ArithmeticReplace,
    ComparisonReplace,
    ConstantReplace,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 3] = [
        OperatorKind::ComparisonReplace,
        OperatorKind::ArithmeticReplace,
        OperatorKind::ConstantReplace,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperatorKind::ArithmeticReplace => "ArithmeticReplace",
            OperatorKind::ComparisonReplace => "ComparisonReplace",
            OperatorKind::ConstantReplace => "ConstantReplace",
        }
    }
}

impl std::fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transient single-line mutation, used as prompt context only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub source_module_path: String,
    /// 1-based.
    pub line_number: usize,
    pub operator_kind: OperatorKind,
    pub original_text: String,
    pub mutated_text: String,
    pub diff: String,
}

impl MutationRecord {
    /// False when no targeted token was on the line.
    pub fn is_applied(&self) -> bool {
        self.original_text != self.mutated_text
    }
}
