pub mod apify;
pub mod mock;

pub use apify::ApifyTweetSource;
pub use mock::MockTweetSource;
