//! Shared test helpers for `coinkit-core` unit tests.
//!
//! Deterministic builders for UTXOs and keys, plus a one-shot HTTP server so
//! transport classification can be tested against real sockets.

use secp256k1::constants::CURVE_ORDER;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::types::UnspentOutput;

// ==============================================================================
// UTXO Helpers
// ==============================================================================

/// A confirmed P2WPKH-looking output whose outpoint id is `[id; 32]`.
pub fn utxo(id: u8, amount: u128) -> UnspentOutput {
    UnspentOutput {
        outpoint_id: vec![id; 32],
        output_index: 0,
        amount,
        locking_script: vec![0x00, 0x14].into_iter().chain([id; 20]).collect(),
        confirmed_height: Some(100),
    }
}

// ==============================================================================
// Key Helpers
// ==============================================================================

/// Deterministic secret key `[byte; 32]`. `byte` must be non-zero.
pub fn secret_key(byte: u8) -> SecretKey {
    SecretKey::from_slice(&[byte; 32]).expect("repeated non-zero byte is a valid key")
}

/// Compressed SEC1 public key for `secret`.
pub fn public_key_bytes(secret: &SecretKey) -> Vec<u8> {
    PublicKey::from_secret_key(&Secp256k1::new(), secret)
        .serialize()
        .to_vec()
}

/// Low-S compact signature, as `libsecp256k1` produces it.
pub fn sign_compact(secret: &SecretKey, digest: &[u8; 32]) -> [u8; 64] {
    Secp256k1::new()
        .sign_ecdsa(&Message::from_digest(*digest), secret)
        .serialize_compact()
}

/// Replace `s` with `n - s`, turning a low-S signature into its high-S twin.
pub fn flip_s(compact: &[u8; 64]) -> [u8; 64] {
    let mut out = *compact;
    let mut borrow = 0u16;
    for i in (0..32).rev() {
        let minuend = u16::from(CURVE_ORDER[i]);
        let subtrahend = u16::from(compact[32 + i]) + borrow;
        if minuend >= subtrahend {
            out[32 + i] = (minuend - subtrahend) as u8;
            borrow = 0;
        } else {
            out[32 + i] = (minuend + 256 - subtrahend) as u8;
            borrow = 1;
        }
    }
    out
}

// ==============================================================================
// HTTP Helpers
// ==============================================================================

/// Serve exactly one HTTP response on a random local port and return the
/// base URL.
pub async fn serve_once(status: u16, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });
    format!("http://{addr}")
}

async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + content_length {
            return;
        }
    }
}
