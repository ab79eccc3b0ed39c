mod handler;
pub mod model;

pub use handler::{create_team, list_teams, set_team_available};
