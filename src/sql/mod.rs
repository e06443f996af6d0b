//! PostgreSQL statement generation for [`PgStore`](crate::store::PgStore).
//! Identifiers come from the resource document; values are always bound.

mod builder;
mod params;

pub use builder::{
    count, delete, exists, insert, qualified_table, restore, select_by_column_in, select_by_key,
    select_by_keys, select_by_keys_batched, select_page, soft_delete, update, QueryBuf, MAX_KEYS_PER_STATEMENT,
};
pub use params::PgBindValue;
