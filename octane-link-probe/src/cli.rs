//! Command-line options and the callbacks the probe installs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use octane_link::config::LinkConfig;
use octane_link::payload::AssetMissingRequest;
use octane_link::signature::{AssetMissing, FuncType, Signature, SignatureVisitor};
use octane_link::{CallbackId, CallbackRegistry};

#[derive(Debug, Parser)]
#[command(name = "octane-link-probe", about = "Log every callback an Octane renderer delivers")]
pub struct ProbeArgs {
    /// Renderer address (host:port, http://host:port or unix:/path).
    #[arg(long, env = "OCTANE_LINK_ADDRESS")]
    pub address: Option<String>,

    /// Config file (defaults to ~/.config/octane-link/link.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Callback source token sent when opening the stream.
    #[arg(long)]
    pub source: Option<String>,

    /// Outstanding callbacks allowed per signature.
    #[arg(long)]
    pub max_callbacks: Option<u32>,

    /// Directory searched when the renderer reports a missing asset.
    #[arg(long)]
    pub asset_dir: Option<PathBuf>,
}

impl ProbeArgs {
    /// Config file (explicit or default) with command-line overrides applied.
    pub fn resolve_config(&self) -> anyhow::Result<LinkConfig> {
        let mut config = match &self.config {
            Some(path) => LinkConfig::load(path)?,
            None => LinkConfig::load_or_default(),
        };
        if let Some(address) = &self.address {
            config.server_address = address.clone();
        }
        if let Some(source) = &self.source {
            config.callback_source = Some(source.clone());
        }
        if let Some(max) = self.max_callbacks {
            config.max_callbacks_per_type = max;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Look for `file_name`'s base name directly inside `dir`.
pub fn find_asset(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let base = Path::new(file_name).file_name()?;
    let candidate = dir.join(base);
    candidate.is_file().then_some(candidate)
}

struct LogEvents<'a> {
    registry: &'a CallbackRegistry,
}

impl SignatureVisitor for LogEvents<'_> {
    type Output = octane_link::Result<CallbackId>;

    fn visit<S: Signature>(self) -> Self::Output {
        self.registry.register_new::<S, _>(|args: S::Args| {
            let func_type = S::FUNC_TYPE;
            let payload = serde_json::to_string(&args).unwrap_or_default();
            tracing::info!(%func_type, "{payload}");
            S::Output::default()
        })
    }
}

/// Register a logging callback for every signature. With `asset_dir`, the
/// `AssetMissing` callback also tries to resolve the file there.
pub fn install_callbacks(
    registry: &Arc<CallbackRegistry>,
    asset_dir: Option<PathBuf>,
) -> octane_link::Result<Vec<(FuncType, CallbackId)>> {
    let mut ids = Vec::with_capacity(FuncType::ALL.len());
    for &func_type in FuncType::ALL {
        let id = match (&asset_dir, func_type) {
            (Some(dir), FuncType::AssetMissing) => {
                let dir = dir.clone();
                registry.register_new::<AssetMissing, _>(move |req: AssetMissingRequest| {
                    match find_asset(&dir, &req.file_name) {
                        Some(found) => {
                            tracing::info!("resolved {} -> {}", req.file_name, found.display());
                            found.to_string_lossy().into_owned()
                        }
                        None => {
                            tracing::warn!("missing asset {} (node {})", req.file_name, req.node_name);
                            String::new()
                        }
                    }
                })?
            }
            _ => func_type.visit(LogEvents { registry })?,
        };
        ids.push((func_type, id));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.toml");
        std::fs::write(&path, "server_address = \"10.0.0.5:51022\"\nmax_callbacks_per_type = 8\n")
            .unwrap();

        let args = ProbeArgs::parse_from([
            "octane-link-probe",
            "--config",
            path.to_str().unwrap(),
            "--source",
            "probe-1",
        ]);
        let config = args.resolve_config().unwrap();
        assert_eq!(config.max_callbacks_per_type, 8);
        assert_eq!(config.callback_source(), "probe-1");
        // Without --address the file value stands (unless the env var is set).
        if std::env::var("OCTANE_LINK_ADDRESS").is_err() {
            assert_eq!(config.server_address, "10.0.0.5:51022");
        }
    }

    #[test]
    fn one_callback_per_signature() {
        let registry = Arc::new(CallbackRegistry::default());
        let ids = install_callbacks(&registry, None).unwrap();
        assert_eq!(ids.len(), FuncType::ALL.len());
        assert_eq!(registry.len(), FuncType::ALL.len());
        assert!(ids.iter().all(|(_, id)| *id == CallbackId(1)));
    }

    #[test]
    fn asset_dir_resolves_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wood.png"), b"png").unwrap();

        let registry = Arc::new(CallbackRegistry::default());
        let ids = install_callbacks(&registry, Some(dir.path().to_path_buf())).unwrap();
        let (_, id) = ids
            .iter()
            .find(|(ft, _)| *ft == FuncType::AssetMissing)
            .copied()
            .unwrap();

        let found = registry.invoke::<AssetMissing>(
            id,
            AssetMissingRequest {
                file_name: "C:\\old\\project\\wood.png".replace('\\', "/"),
                ..Default::default()
            },
        );
        assert_eq!(found, dir.path().join("wood.png").to_string_lossy());

        let missing = registry.invoke::<AssetMissing>(
            id,
            AssetMissingRequest {
                file_name: "stone.png".to_string(),
                ..Default::default()
            },
        );
        assert!(missing.is_empty());
    }
}
