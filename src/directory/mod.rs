mod api;
mod server;

pub use api::{fetch_station_page, fetch_station_total};
pub use server::{
    ProbeCache, ProbeResult, ServerInfo, fastest, probe_all, probe_server, select_server,
};
