pub mod text;
pub mod timing;
