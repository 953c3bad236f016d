//! Integration tests for portabooru-api
//!
//! Uses wiremock to simulate the Danbooru API and verifies end-to-end
//! behavior of the client, listing pagination, tag lookup and downloads.

mod common;

mod test_assets;
mod test_client;
mod test_listing;
