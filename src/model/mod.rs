/// 测试模型 - Call、Call 序列与变量声明
pub mod tokens;
pub mod types;

pub use tokens::AttemptTokens;
pub use types::{Call, CallIdGenerator, CallSequence, Scope, VariableDecl, VariableValue};
