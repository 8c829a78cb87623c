pub use crate::error::*;

mod billing;
mod config;
mod database;
mod entity;
mod error;
mod gateway;
mod identity;
mod mirror;
mod modify;
mod query;
mod retry;

#[cfg(feature = "prelude")]
pub mod prelude {
    pub mod entity {
        pub use crate::entity::*;
    }
    pub mod billing {
        pub use crate::billing::*;
    }
}

#[cfg(feature = "interface")]
pub mod interface {
    pub mod database {
        pub use crate::database::*;
    }
    pub mod query {
        pub use crate::query::*;
    }
    pub mod update {
        pub use crate::modify::*;
    }
    pub mod gateway {
        pub use crate::gateway::*;
    }
    pub mod identity {
        pub use crate::identity::*;
    }
    pub mod mirror {
        pub use crate::mirror::*;
    }
    pub mod config {
        pub use crate::config::*;
    }
    pub mod retry {
        pub use crate::retry::*;
    }
}
