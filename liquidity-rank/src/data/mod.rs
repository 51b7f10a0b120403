pub mod provider;
pub mod types;
pub mod vol_rank;
pub mod xignite;

pub use provider::{
    ChainProvider, EarningsProvider, FetchError, FundamentalsProvider, TickerUniverse, VolRankSource,
};
pub use types::{
    EarningsRecord, FundamentalsRecord, MarketTiming, OptionQuote, OptionType, VolRankRecord,
};
pub use vol_rank::{load_vol_ranks, VolRankFile};
pub use xignite::{XigniteClient, XigniteError, XigniteSettings};
