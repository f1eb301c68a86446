//! Offload mirror — a background worker holding a write-through copy of
//! every layer grid, so expensive composites can run off the main path.
//!
//! Protocol (all main-to-worker traffic is fire-and-forget):
//! * Pixel edits forward incrementally as they happen.
//! * Rebuild-style operations (segmentation, merge, split, undo/redo,
//!   project load) push whole replacement grids instead.
//! * Metadata (order / grouping / visibility / opacity) syncs as a whole
//!   list; the worker never mutates metadata on its own.
//! * Composite requests carry a monotonically increasing id; the handle
//!   drops any response whose id is not the most recent request, so a slow
//!   older composite can never overwrite a newer one.

use std::collections::HashMap;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use uuid::Uuid;

use crate::color::Rgba;
use crate::composite::{self, LayerSlice};
use crate::grid::PixelGrid;
use crate::{log_info, log_warn};

/// Per-layer metadata the worker needs for compositing. Pixel data travels
/// separately (incremental pixels or whole-grid replacements).
#[derive(Clone, Debug, PartialEq)]
pub struct LayerMeta {
    pub id: Uuid,
    pub order: f64,
    pub group_id: Option<Uuid>,
    pub visible: bool,
    pub opacity: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupMeta {
    pub id: Uuid,
    pub order: f64,
    pub visible: bool,
}

enum MirrorCommand {
    SetPixel {
        layer_id: Uuid,
        x: u32,
        y: u32,
        pixel: Option<Rgba>,
    },
    /// Whole-grid replacement, encoded as a flat RGBA byte buffer.
    ReplaceLayer {
        id: Uuid,
        width: u32,
        height: u32,
        bytes: Vec<u8>,
    },
    RemoveLayer {
        id: Uuid,
    },
    SyncMeta {
        layers: Vec<LayerMeta>,
        groups: Vec<GroupMeta>,
    },
    Composite {
        request_id: u64,
    },
    Shutdown,
}

struct CompositeResponse {
    request_id: u64,
    pixels: Vec<u8>,
}

// ============================================================================
// HANDLE — owned by the document, lives on the main path
// ============================================================================

#[derive(Debug)]
pub struct MirrorHandle {
    tx: Sender<MirrorCommand>,
    rx: Receiver<CompositeResponse>,
    /// Id handed out for the most recent composite request. Responses with
    /// any other id are stale and discarded.
    latest_request: u64,
    worker: Option<JoinHandle<()>>,
}

impl MirrorHandle {
    /// Spawn the worker thread with an empty mirror of the given canvas
    /// size. The caller pushes current state afterwards.
    pub fn spawn(width: u32, height: u32) -> Self {
        let (tx, cmd_rx) = unbounded::<MirrorCommand>();
        let (resp_tx, rx) = unbounded::<CompositeResponse>();
        let worker = std::thread::Builder::new()
            .name("skinpaint-mirror".into())
            .spawn(move || worker_loop(width, height, cmd_rx, resp_tx))
            .ok();
        if worker.is_none() {
            log_warn!("mirror: failed to spawn worker thread, composites stay on the main path");
        }
        Self { tx, rx, latest_request: 0, worker }
    }

    fn send(&self, cmd: MirrorCommand) {
        if self.tx.send(cmd).is_err() {
            // Worker is gone; the document falls back to local composites.
            log_warn!("mirror: worker channel closed, dropping command");
        }
    }

    pub fn forward_set_pixel(&self, layer_id: Uuid, x: u32, y: u32, pixel: Option<Rgba>) {
        self.send(MirrorCommand::SetPixel { layer_id, x, y, pixel });
    }

    pub fn replace_layer(&self, id: Uuid, width: u32, height: u32, bytes: Vec<u8>) {
        self.send(MirrorCommand::ReplaceLayer { id, width, height, bytes });
    }

    pub fn remove_layer(&self, id: Uuid) {
        self.send(MirrorCommand::RemoveLayer { id });
    }

    pub fn sync_meta(&self, layers: Vec<LayerMeta>, groups: Vec<GroupMeta>) {
        self.send(MirrorCommand::SyncMeta { layers, groups });
    }

    /// Ask the worker for a composite of its current mirror state. Returns
    /// the request id; any composite answered for an earlier id is dropped
    /// by [`poll_composite`].
    pub fn request_composite(&mut self) -> u64 {
        self.latest_request += 1;
        self.send(MirrorCommand::Composite { request_id: self.latest_request });
        self.latest_request
    }

    /// Non-blocking poll for a finished composite. Stale responses (older
    /// request ids) are consumed and discarded.
    pub fn poll_composite(&mut self) -> Option<Vec<u8>> {
        let mut latest: Option<Vec<u8>> = None;
        loop {
            match self.rx.try_recv() {
                Ok(resp) if resp.request_id == self.latest_request => {
                    latest = Some(resp.pixels);
                }
                Ok(_) => {} // stale
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        latest
    }
}

impl Drop for MirrorHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(MirrorCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ============================================================================
// WORKER — owns the mirrored grids, never touches document state
// ============================================================================

fn worker_loop(
    width: u32,
    height: u32,
    rx: Receiver<MirrorCommand>,
    tx: Sender<CompositeResponse>,
) {
    let mut grids: HashMap<Uuid, PixelGrid> = HashMap::new();
    let mut layers: Vec<LayerMeta> = Vec::new();
    let mut groups: Vec<GroupMeta> = Vec::new();

    log_info!("mirror: worker started ({width}x{height})");

    while let Ok(cmd) = rx.recv() {
        match cmd {
            MirrorCommand::SetPixel { layer_id, x, y, pixel } => {
                grids
                    .entry(layer_id)
                    .or_insert_with(|| PixelGrid::with_size(width, height))
                    .set(x, y, pixel);
            }
            MirrorCommand::ReplaceLayer { id, width: w, height: h, bytes } => {
                match PixelGrid::from_bytes(w, h, &bytes) {
                    Some(grid) => {
                        grids.insert(id, grid);
                    }
                    None => {
                        log_warn!("mirror: replace_layer for {id} had a malformed buffer");
                    }
                }
            }
            MirrorCommand::RemoveLayer { id } => {
                grids.remove(&id);
            }
            MirrorCommand::SyncMeta { layers: l, groups: g } => {
                layers = l;
                groups = g;
            }
            MirrorCommand::Composite { request_id } => {
                let pixels = composite_mirror(width, height, &grids, &layers, &groups);
                if tx.send(CompositeResponse { request_id, pixels }).is_err() {
                    break; // handle dropped
                }
            }
            MirrorCommand::Shutdown => break,
        }
    }

    log_info!("mirror: worker stopped");
}

fn composite_mirror(
    width: u32,
    height: u32,
    grids: &HashMap<Uuid, PixelGrid>,
    layers: &[LayerMeta],
    groups: &[GroupMeta],
) -> Vec<u8> {
    let slices: Vec<LayerSlice> = layers
        .iter()
        .filter_map(|meta| {
            let grid = grids.get(&meta.id)?;
            let group = meta.group_id.and_then(|gid| {
                groups.iter().find(|g| g.id == gid).map(|g| (g.order, g.visible))
            });
            Some(LayerSlice {
                grid,
                order: meta.order,
                group,
                visible: meta.visible,
                opacity: meta.opacity,
            })
        })
        .collect();
    composite::flatten(width, height, &slices)
}

// ============================================================================
// TESTS
// ============================================================================
