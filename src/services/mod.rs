pub mod acquisition;
pub mod avatar_mapping;
pub mod clock;
pub mod pipeline;
pub mod platforms;
pub mod posting;
pub mod rate_limit;
pub mod retry;
pub mod row_filter;
pub mod script;
pub mod sheets;
pub mod video;
pub mod writeback;
