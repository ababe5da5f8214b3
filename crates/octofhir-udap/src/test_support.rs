//! Shared helpers for unit tests.

pub(crate) mod fixtures {
    pub const CLIENT_KEY: &str = include_str!("../tests/fixtures/client.key.pem");
    pub const CLIENT_CERT: &str = include_str!("../tests/fixtures/client.cert.pem");
    pub const CLIENT_NOSAN_CERT: &str = include_str!("../tests/fixtures/client-nosan.cert.pem");
    pub const CLIENT_MULTISAN_CERT: &str =
        include_str!("../tests/fixtures/client-multisan.cert.pem");
    pub const CLIENT_DNS_CERT: &str = include_str!("../tests/fixtures/client-dns.cert.pem");
    pub const SERVER_KEY: &str = include_str!("../tests/fixtures/server.key.pem");
    pub const SERVER_CERT: &str = include_str!("../tests/fixtures/server.cert.pem");
    pub const SERVER_EC_KEY: &str = include_str!("../tests/fixtures/server-ec.key.pem");
    pub const SERVER_EC_CERT: &str = include_str!("../tests/fixtures/server-ec.cert.pem");
    pub const ROGUE_KEY: &str = include_str!("../tests/fixtures/rogue.key.pem");
}

use crate::keys::ClientKeyMaterial;

pub(crate) fn client_keys() -> ClientKeyMaterial {
    ClientKeyMaterial::from_pem(fixtures::CLIENT_KEY, fixtures::CLIENT_CERT).unwrap()
}

pub(crate) fn server_keys() -> ClientKeyMaterial {
    ClientKeyMaterial::from_pem(fixtures::SERVER_KEY, fixtures::SERVER_CERT).unwrap()
}
