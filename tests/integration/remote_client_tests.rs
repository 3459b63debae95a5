//! Backend client tests against the mock board's scripted HTTP stack.

use smartbin::app::credentials::{self, Credentials};
use smartbin::app::ports::{ConnectivityError, HttpError, HttpMethod};
use smartbin::app::remote::RemoteClient;
use smartbin::config::DeviceConfig;
use smartbin::error::Error;
use smartbin::sensors::SensorReading;

use crate::mock_hw::MockBoard;

fn online_board() -> MockBoard {
    let mut board = MockBoard::provisioned();
    board.connected = true;
    board
}

fn client_for(board: &MockBoard) -> RemoteClient {
    let mut client = RemoteClient::new(&DeviceConfig::default());
    client.load_credentials(&Credentials::load(board));
    client
}

fn readings() -> [SensorReading; 3] {
    [
        SensorReading { channel: 0, weight_kg: 1.5, timestamp_ms: 10, valid: true },
        SensorReading { channel: 1, weight_kg: 0.0, timestamp_ms: 10, valid: false },
        SensorReading { channel: 2, weight_kg: 12.25, timestamp_ms: 11, valid: true },
    ]
}

#[test]
fn authenticate_passes_on_200() {
    let mut board = online_board();
    let mut client = client_for(&board);
    client.authenticate(&mut board).unwrap();
    assert!(client.is_authenticated());
    assert_eq!(client.device_id(), "smartbin_001122aabbcc");
    assert_eq!(board.http_calls.len(), 1);
    assert_eq!(board.http_calls[0].method, HttpMethod::Get);
}

#[test]
fn authenticate_rejects_other_statuses() {
    for status in [201, 401, 500] {
        let mut board = online_board();
        board.health_status = status;
        let mut client = client_for(&board);
        assert_eq!(client.authenticate(&mut board), Err(Error::Http(HttpError::Status(status))));
        assert!(!client.is_authenticated());
    }
}

#[test]
fn authenticate_needs_key_and_link() {
    let mut board = MockBoard::new();
    board.connected = true;
    let mut client = client_for(&board);
    assert_eq!(client.authenticate(&mut board), Err(Error::Config("API key not provisioned")));

    let mut board = MockBoard::provisioned();
    let mut client = client_for(&board);
    assert_eq!(
        client.authenticate(&mut board),
        Err(Error::Connectivity(ConnectivityError::NotConnected))
    );
    assert!(board.http_calls.is_empty());
}

#[test]
fn submit_requires_authentication() {
    let mut board = online_board();
    let mut client = client_for(&board);
    assert_eq!(
        client.submit(&readings(), 100, &mut board),
        Err(Error::Config("client not authenticated"))
    );
    assert!(board.submits().is_empty());
}

#[test]
fn submit_posts_only_valid_readings() {
    let mut board = online_board();
    let mut client = client_for(&board);
    client.authenticate(&mut board).unwrap();

    assert_eq!(client.submit(&readings(), 5000, &mut board), Ok(2));
    let call = board.submits()[0].clone();
    assert_eq!(call.url, "https://api.example.com/api/v1/sensor-data");
    assert_eq!(call.bearer, "key-123");
    let body = call.body.unwrap();
    assert_eq!(body["timestamp"], 5000);
    assert_eq!(body["sensor_data"][0]["bin_id"], 0);
    assert_eq!(body["sensor_data"][1]["bin_id"], 2);
    assert_eq!(body["sensor_data"][1]["weight"], 12.25);
    assert_eq!(body["sensor_data"][1]["timestamp"], 11);
}

#[test]
fn submit_accepts_any_2xx() {
    let mut board = online_board();
    let mut client = client_for(&board);
    client.authenticate(&mut board).unwrap();
    for status in [200, 201, 204] {
        board.submit_status = status;
        assert!(client.submit(&readings(), 1, &mut board).is_ok());
    }
    board.submit_status = 400;
    assert_eq!(
        client.submit(&readings(), 1, &mut board),
        Err(Error::Http(HttpError::Status(400)))
    );
}

#[test]
fn submit_after_link_loss_fails_without_request() {
    let mut board = online_board();
    let mut client = client_for(&board);
    client.authenticate(&mut board).unwrap();
    board.connected = false;
    assert_eq!(
        client.submit(&readings(), 1, &mut board),
        Err(Error::Connectivity(ConnectivityError::NotConnected))
    );
    assert!(board.submits().is_empty());
}

#[test]
fn reset_drops_authentication() {
    let mut board = online_board();
    let mut client = client_for(&board);
    client.authenticate(&mut board).unwrap();
    client.reset();
    assert!(!client.is_authenticated());
}

#[test]
fn missing_url_falls_back_to_default_backend() {
    let mut board = MockBoard::new();
    credentials::store_api(&mut board, "key-123", "", "smartbin_001122aabbcc").unwrap();
    board.connected = true;
    let mut client = client_for(&board);
    client.authenticate(&mut board).unwrap();
    assert!(board.http_calls[0].url.starts_with("https://smart-bins-api-uay7w.ondigitalocean.app/"));
    assert!(board.http_calls[0].url.ends_with("/health"));
}

#[test]
fn submit_with_no_valid_readings_still_sends_envelope() {
    let mut board = online_board();
    let mut client = client_for(&board);
    client.authenticate(&mut board).unwrap();

    let invalid = [SensorReading { channel: 0, weight_kg: 3.0, timestamp_ms: 1, valid: false }];
    assert_eq!(client.submit(&invalid, 777, &mut board), Ok(0));
    let body = board.submits()[0].body.clone().unwrap();
    assert_eq!(body["device_id"], "smartbin_001122aabbcc");
    assert_eq!(body["timestamp"], 777);
    assert_eq!(body["sensor_data"].as_array().unwrap().len(), 0);
}
