pub mod decision;
pub mod diagnostics;
pub mod outcome;
pub mod post;
pub mod row;
pub mod video;
