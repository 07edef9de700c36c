//! Loading serialized nets into the scheduler.
//!
//! A net file holds one JSON net document. Its root fragment name is the
//! net id. Loading runs the same steps for every file:
//!
//! 1. parse the document against the primitive registry
//! 2. `correct_links` on the root fragment
//! 3. link against the device table, with the netcomm channels of every
//!    net already loaded available to `Core::InterNetIn`
//! 4. hand the net to the scheduler
//!
//! A chain of files is loaded in order; each net becomes the successor of
//! the previous one, so later nets may read channels of earlier ones.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rpi_common::config::EngineConfig;
use rpi_common::device::DeviceRegistry;
use rpi_common::value::Value;
use rpi_net::fragment::{from_json, FragmentGraph, NodeId};
use rpi_net::runtime::{Linker, NetHandle, NetListener, NetStatus, PrimitiveRegistry, Scheduler};
use tracing::{debug, info};

use crate::error::RccError;

/// Logs status changes and netcomm batches of a net.
#[derive(Debug, Default)]
pub struct LogListener;

impl NetListener for LogListener {
    fn value_changed(&self, net: &str, key: &str, value: &Value, timestamp: f64) {
        debug!(net, key, %value, timestamp, "netcomm value");
    }

    fn status_changed(&self, net: &str, status: NetStatus) {
        info!(net, %status, "net status");
    }
}

/// Parses, links and loads net files.
pub struct NetLoader<'a> {
    registry: &'a PrimitiveRegistry,
    devices: &'a dyn DeviceRegistry,
    config: &'a EngineConfig,
    listener: Arc<dyn NetListener>,
}

impl<'a> NetLoader<'a> {
    /// Create a loader. Every loaded net reports to a [`LogListener`].
    pub fn new(
        registry: &'a PrimitiveRegistry,
        devices: &'a dyn DeviceRegistry,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            registry,
            devices,
            config,
            listener: Arc::new(LogListener),
        }
    }

    /// Report to `listener` instead of the default log listener.
    pub fn with_listener(mut self, listener: Arc<dyn NetListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Load the net document `json` into `scheduler`. Does not start it.
    pub fn load_str(&self, scheduler: &mut Scheduler, json: &str) -> Result<NetHandle, RccError> {
        let (graph, root) = from_json(json, self.registry).map_err(|source| RccError::Codec {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        self.load_graph(scheduler, graph, root)
    }

    /// Load the net file at `path` into `scheduler`. Does not start it.
    pub fn load_file(&self, scheduler: &mut Scheduler, path: &Path) -> Result<NetHandle, RccError> {
        let json = std::fs::read_to_string(path).map_err(|source| RccError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (graph, root) = from_json(&json, self.registry).map_err(|source| RccError::Codec {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_graph(scheduler, graph, root)
    }

    fn load_graph(
        &self,
        scheduler: &mut Scheduler,
        mut graph: FragmentGraph,
        root: NodeId,
    ) -> Result<NetHandle, RccError> {
        let id = graph.node(root).name().to_string();
        graph
            .correct_links(root)
            .map_err(|source| RccError::Fragment {
                net: id.clone(),
                source,
            })?;
        let net = Linker::new(
            self.registry,
            self.devices,
            self.config,
            scheduler.executor().clone(),
        )
        .with_predecessors(scheduler.netcomm_tables())
        .link(&id, &graph, root)
        .map_err(|source| RccError::Link {
            net: id.clone(),
            source,
        })?;
        let handle = scheduler.load(net)?;
        handle.add_listener(Arc::clone(&self.listener));
        Ok(handle)
    }

    /// Load `paths` as a chain and start its first net.
    pub fn load_chain(
        &self,
        scheduler: &mut Scheduler,
        paths: &[impl AsRef<Path>],
    ) -> Result<Vec<NetHandle>, RccError> {
        let mut handles: Vec<NetHandle> = Vec::with_capacity(paths.len());
        for path in paths {
            let handle = self.load_file(scheduler, path.as_ref())?;
            if let Some(previous) = handles.last() {
                scheduler.set_successor(previous.id(), handle.id())?;
            }
            handles.push(handle);
        }
        if let Some(first) = handles.first() {
            scheduler.start(first.id())?;
        }
        info!(nets = handles.len(), "net chain loaded");
        Ok(handles)
    }
}
