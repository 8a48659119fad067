mod query;
mod station;
mod store;
mod user;

pub use query::{
    CategoryCount, FILTER_LIMIT, LIST_LIMIT, SEARCH_LIMIT, SearchField, StationOrder,
    fts_expression,
};
pub use station::Station;
pub use store::Catalog;
