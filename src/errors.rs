use thiserror::Error;

/// Errors raised while turning text into nodes. Runtime problems never end
/// up here: evaluation reports them as fault nodes instead.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum CompileError {
    #[error("Failed to parse expression: '{text}'")]
    Parse { text: String },
    #[error("Invalid script structure in line {line}")]
    Interpret { line: usize, cause: Option<Box<CompileError>> },
    #[error("Node expects {expected} children, got {found}")]
    Rebuild { expected: usize, found: usize },
    #[error("Invalid variable name '{0}'")]
    InvalidName(String),
}

impl CompileError {
    pub(crate) fn parse(chars: &[char]) -> Self {
        CompileError::Parse {
            text: chars.iter().collect(),
        }
    }

    pub(crate) fn interpret(line: usize) -> Self {
        CompileError::Interpret { line, cause: None }
    }

    /// Line number (1-based) for script errors
    pub fn line(&self) -> Option<usize> {
        match self {
            CompileError::Interpret { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Compilation result: either a value (by default a node) or an error
pub type CompileResult<T = crate::node::Node> = Result<T, CompileError>;
