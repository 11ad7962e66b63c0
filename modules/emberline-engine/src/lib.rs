//! The ranking engine: candidate aggregation, influence-weighted scoring
//! with time decay, breakout detection, search-result reconciliation, and
//! the raw-post dequeue protocol.

pub mod breakout;
pub mod dequeue;
pub mod drain;
pub mod merge;
pub mod score;
pub mod trending;

pub use breakout::{find_breakout_link, promote};
pub use dequeue::dequeue;
pub use drain::{drain_raw_posts, ContentExtractor};
pub use merge::{merge, search_items};
pub use score::score_link;
pub use trending::{find_top_links, TrendingOptions};
