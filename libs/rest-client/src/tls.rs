//! HTTPS connector and trust anchors.

use crate::config::{RootStore, TransportSecurity};
use crate::error::RestError;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::crypto::CryptoProvider;
use rustls_pki_types::CertificateDer;
use std::sync::{Arc, LazyLock};

pub(crate) type Connector = HttpsConnector<HttpConnector>;

/// OS certificates, read on first use. Empty when the store is unusable.
static OS_ROOTS: LazyLock<Vec<CertificateDer<'static>>> = LazyLock::new(|| {
    let loaded = rustls_native_certs::load_native_certs();
    if !loaded.errors.is_empty() {
        tracing::warn!(errors = loaded.errors.len(), "OS certificate store partially unreadable");
    }
    tracing::debug!(count = loaded.certs.len(), "OS root certificates read");
    loaded.certs
});

pub(crate) fn os_roots() -> &'static [CertificateDer<'static>] {
    &OS_ROOTS
}

fn provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn tls_error(reason: impl Into<String>) -> RestError {
    let reason: String = reason.into();
    RestError::Tls(reason.into())
}

fn os_root_config() -> Result<rustls::ClientConfig, RestError> {
    let mut store = rustls::RootCertStore::empty();
    let (added, rejected) = store.add_parsable_certificates(os_roots().iter().cloned());
    if added == 0 {
        return Err(tls_error(format!(
            "OS certificate store has no usable roots ({rejected} rejected)"
        )));
    }
    if rejected > 0 {
        tracing::warn!(added, rejected, "skipped unparsable OS root certificates");
    }
    let config = rustls::ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| RestError::Tls(Box::new(e)))?
        .with_root_certificates(store)
        .with_no_client_auth();
    Ok(config)
}

/// Connector negotiating h2 or http/1.1 over ALPN.
///
/// `TransportSecurity::TlsOnly` makes the connector itself refuse plain
/// `http://` in addition to the per-request scheme check.
pub(crate) fn connector(
    root_store: RootStore,
    transport: TransportSecurity,
) -> Result<Connector, RestError> {
    let schemes = match root_store {
        RootStore::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider())
            .map_err(|e| RestError::Tls(Box::new(e)))?,
        RootStore::Native => HttpsConnectorBuilder::new().with_tls_config(os_root_config()?),
    };
    let protocols = match transport {
        TransportSecurity::AllowInsecureHttp => schemes.https_or_http(),
        TransportSecurity::TlsOnly => schemes.https_only(),
    };
    Ok(protocols.enable_all_versions().build())
}
