//! Tunnel peer reconciliation
//!
//! Maintains the shared WireGuard mesh configuration file: one `[Peer]` block
//! per managed station, deduplicated on the /32 allowed-IP and the public key.
//! The file is rewritten atomically (temp file + rename) with a timestamped
//! snapshot of the previous contents, then the interface is restarted.
//!
//! All reconciliation passes serialize on a per-service mutex; the config file
//! is a single shared mutable resource and concurrent read-modify-write would
//! lose peers.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Utc;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::station;

/// Marker starting every peer block
pub const PEER_MARKER: &str = "[Peer]";

/// Port every station's tunnel endpoint listens on
pub const TUNNEL_PORT: u16 = 13231;

// ============================================================================
// Peer block rendering
// ============================================================================

/// Render the peer block for a station.
///
/// Returns `None` when the station has no tunnel public key configured; such
/// stations are not part of the mesh.
pub fn peer_block(station: &station::Model) -> Option<String> {
    let key = station.tunnel_public_key.as_deref()?.trim();
    if key.is_empty() {
        return None;
    }

    let endpoint_host = station
        .ddns_hostname
        .as_deref()
        .or(station.public_host.as_deref())
        .unwrap_or(&station.internal_host);

    Some(format!(
        "[Peer]\nPublicKey = {}\nEndpoint = {}:{}\nAllowedIPs = {}/32\nPersistentKeepalive = 10",
        key, endpoint_host, TUNNEL_PORT, station.internal_host
    ))
}

// ============================================================================
// Pure reconciliation core
// ============================================================================

/// Split a configuration into blocks at boundaries immediately preceding a
/// peer marker. Any leading `[Interface]` section stays as the first block.
pub fn split_blocks(config: &str) -> Vec<String> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in config.lines() {
        if line.trim_start().starts_with(PEER_MARKER) && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        current.push(line);
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks.into_iter().map(|lines| lines.join("\n")).collect()
}

/// First /32 entry of the block's `AllowedIPs` line
fn allowed_ip_of(block: &str) -> Option<String> {
    for line in block.lines() {
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "AllowedIPs" {
                for part in value.split(',') {
                    if let Some(ip) = part.trim().strip_suffix("/32") {
                        return Some(ip.to_string());
                    }
                }
            }
        }
    }
    None
}

/// Value of the block's `PublicKey` line
fn public_key_of(block: &str) -> Option<String> {
    for line in block.lines() {
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "PublicKey" {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Drop blocks whose allowed-IP or public key appears in a later block.
///
/// Blocks are scanned in reverse so the most recently appended occurrence of a
/// duplicate wins; the surviving blocks keep their original order.
pub fn dedup_blocks(blocks: Vec<String>) -> Vec<String> {
    let mut seen_ips: HashSet<String> = HashSet::new();
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut kept: Vec<String> = Vec::new();

    for block in blocks.into_iter().rev() {
        let ip = allowed_ip_of(&block);
        let key = public_key_of(&block);

        let duplicate = ip.as_ref().is_some_and(|i| seen_ips.contains(i))
            || key.as_ref().is_some_and(|k| seen_keys.contains(k));
        if duplicate {
            continue;
        }

        if let Some(ip) = ip {
            seen_ips.insert(ip);
        }
        if let Some(key) = key {
            seen_keys.insert(key);
        }
        kept.push(block);
    }

    kept.reverse();
    kept
}

/// Join blocks into a well-formed configuration: no blank-only lines inside a
/// block, exactly one blank line between blocks, exactly one trailing newline.
pub fn render_config(blocks: &[String]) -> String {
    let cleaned: Vec<String> = blocks
        .iter()
        .map(|block| {
            block
                .lines()
                .filter(|line| !line.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|block| !block.is_empty())
        .collect();

    if cleaned.is_empty() {
        return String::new();
    }
    format!("{}\n", cleaned.join("\n\n"))
}

/// Produce the replacement configuration for one new/updated peer block.
///
/// The new block is appended before deduplication, so it replaces any earlier
/// block sharing its allowed-IP or public key.
pub fn reconcile(existing: &str, new_block: &str) -> String {
    let mut blocks = split_blocks(existing);
    blocks.push(new_block.to_string());
    render_config(&dedup_blocks(blocks))
}

/// Produce a configuration with every block belonging to the given station
/// (matched on allowed-IP or public key) removed.
pub fn without_station(existing: &str, internal_host: &str, public_key: Option<&str>) -> String {
    let blocks: Vec<String> = split_blocks(existing)
        .into_iter()
        .filter(|block| {
            let ip_match = allowed_ip_of(block).is_some_and(|ip| ip == internal_host);
            let key_match = match public_key {
                Some(key) => public_key_of(block).as_deref() == Some(key),
                None => false,
            };
            !(ip_match || key_match)
        })
        .collect();
    render_config(&dedup_blocks(blocks))
}

// ============================================================================
// TunnelService
// ============================================================================

/// Reconciles the shared tunnel configuration file and restarts the interface.
pub struct TunnelService {
    config_path: PathBuf,
    interface: String,
    /// Single-writer lock over the config file
    lock: Mutex<()>,
}

impl TunnelService {
    pub fn new(config_path: PathBuf, interface: String) -> Self {
        Self {
            config_path,
            interface,
            lock: Mutex::new(()),
        }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Rewrite the configuration with the station's peer block and restart the
    /// interface. No-op for stations without a tunnel public key.
    pub async fn ensure_peer(&self, station: &station::Model) -> Result<()> {
        let Some(block) = peer_block(station) else {
            return Ok(());
        };

        let _guard = self.lock.lock().await;
        let current = self.read_config().await?;
        let updated = reconcile(&current, &block);
        if updated == current {
            return Ok(());
        }
        self.apply_config(&updated).await?;
        self.restart().await
    }

    /// Remove the station's peer block, if present, and restart the interface.
    pub async fn remove_peer(&self, station: &station::Model) -> Result<()> {
        let _guard = self.lock.lock().await;
        let current = self.read_config().await?;
        let updated = without_station(
            &current,
            &station.internal_host,
            station.tunnel_public_key.as_deref(),
        );
        if updated == current {
            return Ok(());
        }
        self.apply_config(&updated).await?;
        self.restart().await
    }

    /// Read the live configuration. A missing file is an empty mesh; any other
    /// read failure is fatal to the request.
    pub async fn read_config(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.config_path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(AppError::Tunnel(format!(
                "Failed to read {}: {}",
                self.config_path.display(),
                e
            ))),
        }
    }

    /// Snapshot the live file with a timestamp suffix, write the new contents
    /// to a temporary path, then atomically replace the live file. No
    /// partially-written configuration is ever visible.
    pub async fn apply_config(&self, contents: &str) -> Result<()> {
        if tokio::fs::try_exists(&self.config_path).await.unwrap_or(false) {
            let backup = PathBuf::from(format!(
                "{}.{}",
                self.config_path.display(),
                Utc::now().timestamp()
            ));
            tokio::fs::copy(&self.config_path, &backup)
                .await
                .map_err(|e| AppError::Tunnel(format!("Failed to snapshot config: {}", e)))?;
        }

        let tmp = PathBuf::from(format!("{}.tmp", self.config_path.display()));
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| AppError::Tunnel(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.config_path)
            .await
            .map_err(|e| AppError::Tunnel(format!("Failed to replace config: {}", e)))?;
        Ok(())
    }

    /// Bring the interface down, then up. A bring-up failure is reported to
    /// the caller; the already-replaced config stays in place and is
    /// recoverable from its snapshot.
    async fn restart(&self) -> Result<()> {
        if let Err(e) = self.wg_quick("down").await {
            tracing::warn!("wg-quick down {} failed: {}", self.interface, e);
        }
        self.wg_quick("up").await
    }

    async fn wg_quick(&self, action: &str) -> Result<()> {
        let output = Command::new("wg-quick")
            .arg(action)
            .arg(&self.interface)
            .output()
            .await
            .map_err(|e| AppError::Tunnel(format!("Failed to spawn wg-quick: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::Tunnel(format!(
                "wg-quick {} {} exited with {}: {}",
                action,
                self.interface,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
