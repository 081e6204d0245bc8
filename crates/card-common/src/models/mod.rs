//! Request payload models, deserialized from the JSON the bot backend sends.

pub mod locker;
pub mod shop;
pub mod stats;
pub mod utils;

pub use locker::{Locker, LockerItem, SourceType};
pub use shop::{
    LocationPoint, Shop, ShopEntry, ShopEntryBanner, ShopEntryLocation, ShopSection,
    ShopSectionLocation,
};
pub use stats::{
    CompetitiveStats, Playtime, RankedStatsEntry, RankedType, Stats, StatsEntry, StatsType,
};
pub use utils::{DropLocation, ProgressBar};
