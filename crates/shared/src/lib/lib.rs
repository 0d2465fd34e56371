pub mod csm;
pub mod eth_spec;
pub mod io;
pub mod merkle_proof;
pub mod rewards;
pub mod util;
pub mod validators;
