use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("no such variable: {0}")]
    UndeclaredVariable(String),
    #[error("{0} is a scalar and cannot be indexed")]
    NotAnArray(String),
    #[error("{0} is an array and needs an index")]
    NotAScalar(String),
    #[error("index {index} out of bounds for {name}({start}:{end})")]
    IndexOutOfBounds {
        name: String,
        index: i64,
        start: i64,
        end: i64,
    },
    #[error("index {index} of {name} does not name a memory cell")]
    UnaddressableIndex { name: String, index: i64 },
    #[error("cannot write to read-only variable {0}")]
    ReadOnly(String),
    #[error("redeclaration of variable {0}")]
    Redeclaration(String),
    #[error("invalid array declaration {name}({start}:{end})")]
    InvalidArray { name: String, start: i64, end: i64 },
    #[error("internal: start() of an empty instruction sequence")]
    EmptySequence,
    #[error("internal: redirecting stub {0} would create a cycle")]
    StubCycle(usize),
    #[error("internal: {0}")]
    Unclassifiable(String),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Advisory diagnostics; never change the generated code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("{0} may be read before it is written")]
    UninitializedRead(String),
    #[error("access {name}({index}) is outside the declared range")]
    IndexOutOfBounds { name: String, index: i64 },
    #[error("infinite loop: condition {0} always holds")]
    InfiniteLoop(String),
}
