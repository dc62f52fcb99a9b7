use certguard_common::crypto::x509::{self, Certificate};
use certguard_common::model::crl::{RevocationEntry, RevocationList};
use certguard_common::model::reason::RevocationReason;
use once_cell::sync::Lazy;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex};
use time::macros::datetime;

pub static TEST_MUTEX: Lazy<Arc<Mutex<bool>>> = Lazy::new(|| Arc::new(Mutex::new(true)));

pub const TEST_STORE_DIR_PATHPARTS: [&str; 5] = [
    env!("CARGO_MANIFEST_DIR"),
    "..",
    "..",
    "target",
    "test-certguard",
];

pub const CERTFILE_CA_PATHPARTS: [&str; 3] =
    [env!("CARGO_MANIFEST_DIR"), "testdata", "ca.crt.pem"];
pub const CERTFILE_CA2_PATHPARTS: [&str; 3] =
    [env!("CARGO_MANIFEST_DIR"), "testdata", "ca2.crt.pem"];
pub const CERTFILE_LEAF_PATHPARTS: [&str; 3] =
    [env!("CARGO_MANIFEST_DIR"), "testdata", "leaf.crt.pem"];
pub const CERTFILE_LEAF_CHAIN_PATHPARTS: [&str; 3] = [
    env!("CARGO_MANIFEST_DIR"),
    "testdata",
    "leaf-chain.crt.pem",
];
pub const CERTFILE_OTHER_PATHPARTS: [&str; 3] =
    [env!("CARGO_MANIFEST_DIR"), "testdata", "other.crt.pem"];
pub const CRLFILE_REVOKED_123456_PATHPARTS: [&str; 3] = [
    env!("CARGO_MANIFEST_DIR"),
    "testdata",
    "revoked-123456.crl",
];
pub const CRLFILE_REVOKED_123456_PEM_PATHPARTS: [&str; 3] = [
    env!("CARGO_MANIFEST_DIR"),
    "testdata",
    "revoked-123456.crl.pem",
];
pub const CRLFILE_REVOKED_MULTI_PATHPARTS: [&str; 3] = [
    env!("CARGO_MANIFEST_DIR"),
    "testdata",
    "revoked-multi.crl",
];
pub const CRLFILE_MALFORMED_PATHPARTS: [&str; 3] =
    [env!("CARGO_MANIFEST_DIR"), "testdata", "malformed.crl"];
pub const CRLFILE_INVALID_REASON_PATHPARTS: [&str; 3] = [
    env!("CARGO_MANIFEST_DIR"),
    "testdata",
    "invalid-reason.crl",
];

/// Load the first certificate from a testdata PEM file
pub fn load_certificate(pathparts: &[&str]) -> Certificate {
    let cert_filepath: PathBuf = pathparts.iter().collect();
    x509::load_certificates_file(&cert_filepath)
        .unwrap()
        .remove(0)
}

/// Build an in-memory revocation list (fixed update window, one day between entry revocation dates)
pub fn create_revocation_list(
    name: &str,
    entries: &[(&str, RevocationReason)],
) -> RevocationList {
    RevocationList {
        name: name.to_string(),
        signature: vec![0x30, 0x01],
        this_update: datetime!(2024-01-02 0:00 UTC),
        next_update: Some(datetime!(2024-02-01 0:00 UTC)),
        raw: vec![0x30, 0x00],
        source_url: None,
        entries: entries
            .iter()
            .enumerate()
            .map(|(idx, (serial, reason))| RevocationEntry {
                serial_number: serial.to_string(),
                reason: *reason,
                revocation_date: datetime!(2024-01-01 0:00 UTC) + time::Duration::days(idx as i64),
            })
            .collect(),
    }
}

/// Wraps a byte vector channel sender
pub struct ChannelWriter {
    /// Byte vector channel sender
    pub channel_sender: mpsc::Sender<Vec<u8>>,
}

impl io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.channel_sender
            .send(buf.to_vec())
            .map(|_| buf.len())
            .map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Receive all pending channel output and return it as text
pub fn gather_rcvd_channel_text(channel_receiver: &mpsc::Receiver<Vec<u8>>) -> String {
    let mut rcvd_data: Vec<u8> = vec![];
    loop {
        match channel_receiver.try_recv() {
            Ok(mut data) => rcvd_data.append(&mut data),
            Err(TryRecvError::Empty) => break,
            Err(err) => panic!("Unexpected received bytearray result: err={:?}", &err),
        }
    }
    String::from_utf8(rcvd_data).unwrap()
}
