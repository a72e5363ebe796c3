pub mod publish;
pub mod receive;
