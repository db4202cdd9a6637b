//! TLS certificate provisioning

use std::path::Path;

use zgate_core::{GateError, Result};

/// PEM-encoded certificate and private key
#[derive(Debug, Clone)]
pub struct CertificatePair {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Produces a certificate when the configured pair is missing
pub trait CertificateGenerator: Send + Sync {
    fn generate(&self, domains: &[String]) -> Result<CertificatePair>;
}

/// Self-signed certificates via `rcgen`
#[derive(Debug, Default, Clone)]
pub struct SelfSignedGenerator;

impl CertificateGenerator for SelfSignedGenerator {
    fn generate(&self, domains: &[String]) -> Result<CertificatePair> {
        let names = if domains.is_empty() {
            vec!["localhost".to_string()]
        } else {
            domains.to_vec()
        };

        let certified = rcgen::generate_simple_self_signed(names)
            .map_err(|e| GateError::certificate(format!("generate: {}", e)))?;

        Ok(CertificatePair {
            cert_pem: certified.cert.pem(),
            key_pem: certified.key_pair.serialize_pem(),
        })
    }
}

fn cert_io(path: &Path, e: std::io::Error) -> GateError {
    GateError::certificate(format!("{}: {}", path.display(), e))
}

async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path).await.map_err(|e| cert_io(path, e))
}

async fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| cert_io(parent, e))?;
    }
    Ok(())
}

async fn write_pem(path: &Path, contents: &str) -> Result<()> {
    create_parent(path).await?;
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| cert_io(path, e))
}

/// Write the private key, owner-only from the moment it exists. A key
/// already on disk is narrowed before it is truncated.
async fn write_private_pem(path: &Path, contents: &str) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    create_parent(path).await?;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(|e| cert_io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| cert_io(path, e))?;
    }

    file.set_len(0).await.map_err(|e| cert_io(path, e))?;
    file.write_all(contents.as_bytes())
        .await
        .map_err(|e| cert_io(path, e))?;
    file.flush().await.map_err(|e| cert_io(path, e))
}

/// Make sure a certificate and key exist, generating both if either is
/// missing. Returns whether a new pair was written.
pub async fn ensure_certificate(
    generator: &dyn CertificateGenerator,
    cert_path: &Path,
    key_path: &Path,
    domains: &[String],
) -> Result<bool> {
    if exists(cert_path).await? && exists(key_path).await? {
        return Ok(false);
    }

    tracing::info!(cert = %cert_path.display(), "router: Generating certificate");
    let pair = generator.generate(domains)?;

    write_pem(cert_path, &pair.cert_pem).await?;
    write_private_pem(key_path, &pair.key_pem).await?;

    Ok(true)
}
