//! Tests for the SpotifyClient builder pattern functionality.

use playlistwatch::{Authz, SpotifyClient};

#[test]
fn test_builder_pattern_basic() {
    let client = SpotifyClient::new("test_client_id".to_string(), "test_secret".to_string());

    // Unauthenticated by default
    assert!(client.get_authz().is_none());
}

#[test]
fn test_builder_pattern_with_authz() {
    let authz = Authz::new(
        "test_access_token".to_string(),
        "test_refresh_token".to_string(),
    );

    let client = SpotifyClient::new("test_client_id".to_string(), "test_secret".to_string())
        .with_authz(authz.clone());

    // Test that authz is stored correctly
    if let Some(stored_authz) = client.get_authz() {
        assert_eq!(stored_authz.access_token, "test_access_token");
        assert_eq!(stored_authz.refresh_token, "test_refresh_token");
    } else {
        panic!("Authz should be stored in client");
    }
}

#[test]
fn test_authz_round_trips_through_json() {
    let authz = Authz::new("access".to_string(), "refresh".to_string());

    let json = serde_json::to_string(&authz).unwrap();
    let restored: Authz = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.access_token, authz.access_token);
    assert_eq!(restored.refresh_token, authz.refresh_token);
}

#[test]
fn test_builder_pattern_with_custom_client() {
    let custom_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap();

    let client = SpotifyClient::new("test_client_id".to_string(), "test_secret".to_string())
        .with_client(custom_client)
        .with_authz_refresh_callback(|_new_authz| {});

    assert!(client.get_authz().is_none());
}
