//! The modular connectivity engine: weight/delay component functions
//! combined through a symbolic expression, realized into explicit connection
//! lists by probabilistic sampling or thresholding.
pub mod arborization;
pub mod expression;
pub mod functions;
pub mod modular;
