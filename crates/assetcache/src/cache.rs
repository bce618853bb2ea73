use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared, TryFutureExt};

use crate::asset::{Asset, AssetKind, Bitmap};
use crate::config::{Config, SourceConfig};
use crate::decode::{Decoder, ImageDecoder};
use crate::error::{LoadError, LoadResult};
use crate::transport::{FilesystemTransport, HttpTransport, Transport};

type LoadChannel = Shared<oneshot::Receiver<LoadResult>>;

/// The raw contents of all cached assets, by path.
pub type CacheStore = BTreeMap<String, Bytes>;

/// A computation in flight.
///
/// The `id` identifies the computation, so that only the computation that registered the entry
/// can ever clear it.
struct Pending {
    id: u64,
    channel: LoadChannel,
}

/// A decoded image along with the contents it was decoded from.
struct Decoded {
    raw: Bytes,
    bitmap: Arc<Bitmap>,
}

#[derive(Default)]
struct Slots {
    cache: CacheStore,
    decoded: BTreeMap<String, Decoded>,
    pending: BTreeMap<String, Pending>,
}

impl Slots {
    /// Returns the resolved asset for `path`, if its cached contents are fully resolved.
    ///
    /// A decoded image only counts while it was decoded from the contents currently cached.
    fn resolved(&self, path: &str, kind: AssetKind) -> Option<Asset> {
        let raw = self.cache.get(path)?;
        match kind {
            AssetKind::Binary => Some(Asset::Binary(raw.clone())),
            AssetKind::Image => self
                .decoded
                .get(path)
                .filter(|decoded| same_buffer(&decoded.raw, raw))
                .map(|decoded| Asset::Image(decoded.bitmap.clone())),
        }
    }

    fn state(&self, path: &str) -> SlotState {
        if self.pending.contains_key(path) {
            SlotState::Pending
        } else if self.resolved(path, AssetKind::classify(path)).is_some() {
            SlotState::Resolved
        } else if self.cache.contains_key(path) {
            SlotState::Failed
        } else {
            SlotState::Absent
        }
    }

    fn is_current(&self, path: &str, id: u64) -> bool {
        self.pending.get(path).is_some_and(|pending| pending.id == id)
    }

    /// Remembers the decoded image of `raw`, or forgets a stale one.
    fn store_decoded(&mut self, path: &str, raw: &Bytes, resolved: &LoadResult) {
        match resolved {
            Ok(Asset::Image(bitmap)) => {
                let decoded = Decoded {
                    raw: raw.clone(),
                    bitmap: bitmap.clone(),
                };
                self.decoded.insert(path.to_owned(), decoded);
            }
            _ => {
                self.decoded.remove(path);
            }
        }
    }
}

fn same_buffer(a: &Bytes, b: &Bytes) -> bool {
    a.len() == b.len() && std::ptr::eq(a.as_ptr(), b.as_ptr())
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    // Slots are never left half-updated, so a poisoned lock is still consistent.
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The observable state of an asset path in an [`AssetCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing is known about the path.
    Absent,
    /// A load for the path is in flight.
    Pending,
    /// The path is cached and resolved.
    Resolved,
    /// The raw contents are cached, but there is no decoded image for them.
    ///
    /// Either decoding failed, or the contents were put into the cache directly.
    Failed,
}

/// Where a computation gets its raw contents from.
enum Source {
    Transport,
    Cached(Bytes),
}

/// The outcome of a single computation, before it is settled into the cache.
enum Computed {
    /// The transport failed, nothing is cached.
    FetchFailed(LoadError),
    /// Contents were fetched from the transport.
    Fetched { raw: Bytes, resolved: LoadResult },
    /// Contents that were already cached were decoded again.
    Redecoded { raw: Bytes, resolved: LoadResult },
}

/// A live, mutable view of the [`CacheStore`] of an [`AssetCache`].
///
/// Changes made through the view are seen by all later operations on the cache: removing an
/// entry makes the next load fetch it again, and inserted contents are served without fetching.
///
/// The cache is locked for as long as the view exists. Calling into the cache while holding a
/// view deadlocks.
pub struct CacheView<'a> {
    slots: MutexGuard<'a, Slots>,
}

impl Deref for CacheView<'_> {
    type Target = CacheStore;

    fn deref(&self) -> &Self::Target {
        &self.slots.cache
    }
}

impl DerefMut for CacheView<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slots.cache
    }
}

impl fmt::Debug for CacheView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.slots.cache.iter()).finish()
    }
}

/// An in-memory cache of assets that fetches every path at most once.
///
/// A [`load`](Self::load) either serves the cached asset, joins the computation already in flight
/// for the path, or spawns a new one. Concurrent callers of the same path thus always share one
/// transport request and observe the same value.
///
/// Computations are spawned onto the current tokio runtime and run to completion even if all
/// callers drop their futures. Transport failures are not cached. Decode failures keep the
/// fetched bytes around so that the next load only retries decoding.
///
/// Cloning the cache is cheap, and clones share all their state.
#[derive(Clone)]
pub struct AssetCache {
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn Decoder>,
    slots: Arc<Mutex<Slots>>,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (cached, pending) = self
            .slots
            .try_lock()
            .map(|slots| (slots.cache.len(), slots.pending.len()))
            .unwrap_or_default();
        f.debug_struct("AssetCache")
            .field("cached", &cached)
            .field("pending", &pending)
            .finish()
    }
}

impl AssetCache {
    pub fn new(transport: Arc<dyn Transport>, decoder: Arc<dyn Decoder>) -> Self {
        Self {
            transport,
            decoder,
            slots: Default::default(),
            next_id: Default::default(),
        }
    }

    /// Creates a cache with the transport configured in `config` and the default
    /// [`ImageDecoder`].
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = match &config.source {
            SourceConfig::Http(source) => Arc::new(HttpTransport::from_config(config, source)?),
            SourceConfig::Filesystem(source) => {
                Arc::new(FilesystemTransport::new(source.path.clone()))
            }
        };

        Ok(Self::new(transport, Arc::new(ImageDecoder::new())))
    }

    /// Loads the asset at `path`.
    ///
    /// Returns, in order of priority:
    /// - an immediately ready future if the asset is cached and resolved,
    /// - a handle to the computation already in flight for `path`,
    /// - a handle to a computation decoding the cached contents again, if an earlier decode failed,
    /// - a handle to a newly spawned fetch otherwise.
    ///
    /// Images resolve to their decoded [`Bitmap`]. All other paths resolve to their raw contents as
    /// [`Asset::Binary`], on the first load just like on cache hits.
    ///
    /// NOTE: This function itself is *not* `async`. The cache is inspected and, if needed, the
    /// computation is registered before this returns. Two loads issued back-to-back are thus
    /// guaranteed to share one computation, even if neither was awaited.
    ///
    /// # Panics
    ///
    /// Panics when a computation needs to be spawned outside of a tokio runtime.
    pub fn load(&self, path: &str) -> BoxFuture<'static, LoadResult> {
        let kind = AssetKind::classify(path);
        let mut slots = lock(&self.slots);

        if let Some(asset) = slots.resolved(path, kind) {
            metric!(counter("assets.slot.hit") += 1, "state" => "resolved");
            tracing::trace!("Serving cached asset {}", path);
            return future::ready(Ok(asset)).boxed();
        }

        if let Some(pending) = slots.pending.get(path) {
            // A concurrent load was deduplicated.
            metric!(counter("assets.slot.hit") += 1, "state" => "pending");
            tracing::trace!("Joining in-flight load of {}", path);
            return wait(pending.channel.clone());
        }

        let source = match slots.cache.get(path) {
            Some(raw) => {
                metric!(counter("assets.slot.hit") += 1, "state" => "failed");
                tracing::trace!("Retrying decode of cached asset {}", path);
                Source::Cached(raw.clone())
            }
            None => {
                metric!(counter("assets.slot.miss") += 1);
                Source::Transport
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        let channel = receiver.shared();
        let pending = Pending {
            id,
            channel: channel.clone(),
        };
        slots.pending.insert(path.to_owned(), pending);

        // The computation is registered, later loads join it. Spawning happens without the lock,
        // as a failed spawn drops the guard, which needs to clear the entry again.
        drop(slots);
        self.spawn_computation(path.to_owned(), id, source, sender);

        wait(channel)
    }

    /// Loads all assets at `paths`.
    ///
    /// Every load is issued before any of them is awaited, so duplicate paths share a single
    /// computation. The resulting assets are in the same order as `paths`.
    ///
    /// # Errors
    ///
    /// Fails with the first error of any of the loads, without returning partial results.
    pub fn load_batch<I>(&self, paths: I) -> BoxFuture<'static, LoadResult<Vec<Asset>>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let loads: Vec<_> = paths
            .into_iter()
            .map(|path| self.load(path.as_ref()))
            .collect();

        future::try_join_all(loads).boxed()
    }

    /// Returns a live view of all cached raw contents.
    ///
    /// This contains every path that was fetched successfully, including images whose decoding
    /// failed, but not paths that are still pending. Changes made through the view apply to the
    /// cache itself. This is meant for inspection and debugging.
    ///
    /// The view locks the cache. Drop it before calling any other method on the cache.
    pub fn get_cache(&self) -> CacheView<'_> {
        CacheView {
            slots: lock(&self.slots),
        }
    }

    /// Returns the current state of `path`.
    pub fn state(&self, path: &str) -> SlotState {
        lock(&self.slots).state(path)
    }

    /// Whether raw contents for `path` are cached.
    pub fn contains(&self, path: &str) -> bool {
        lock(&self.slots).cache.contains_key(path)
    }

    /// The number of cached paths, not counting pending loads.
    pub fn len(&self) -> usize {
        lock(&self.slots).cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes `path` from the cache.
    ///
    /// This is a no-op if `path` is not cached. A fetch that is in flight is not affected and will
    /// cache its result once it completes. A decode of cached contents that is in flight does not
    /// bring them back.
    pub fn remove(&self, path: &str) {
        let mut slots = lock(&self.slots);
        slots.decoded.remove(path);
        if slots.cache.remove(path).is_some() {
            tracing::debug!("Removed {} from the asset cache", path);
        }
    }

    /// Removes all cached paths.
    ///
    /// Loads that are in flight are not affected.
    pub fn remove_all(&self) {
        let mut slots = lock(&self.slots);
        slots.cache.clear();
        slots.decoded.clear();
        tracing::debug!(
            "Cleared the asset cache, {} loads pending",
            slots.pending.len()
        );
    }

    /// Spawns the computation `id` for `path`, which sends its result to `sender`.
    ///
    /// The caller must have registered the matching pending entry already.
    fn spawn_computation(
        &self,
        path: String,
        id: u64,
        source: Source,
        sender: oneshot::Sender<LoadResult>,
    ) {
        let transport = Arc::clone(&self.transport);
        let decoder = Arc::clone(&self.decoder);
        let guard = PendingGuard {
            slots: Arc::clone(&self.slots),
            path,
            id,
            settled: false,
        };

        let computation = async move {
            let computed =
                compute(transport.as_ref(), decoder.as_ref(), &guard.path, source).await;
            let result = guard.settle(computed);
            sender.send(result).ok();
        };

        tokio::spawn(computation);
    }
}

/// Awaits a computation channel.
fn wait(channel: LoadChannel) -> BoxFuture<'static, LoadResult> {
    channel
        .unwrap_or_else(|_cancelled| Err(LoadError::Interrupted))
        .boxed()
}

/// Fetches and decodes a single asset.
async fn compute(
    transport: &dyn Transport,
    decoder: &dyn Decoder,
    path: &str,
    source: Source,
) -> Computed {
    let kind = AssetKind::classify(path);

    let (raw, fetched) = match source {
        Source::Cached(raw) => (raw, false),
        Source::Transport => {
            tracing::debug!("Fetching {} asset {}", kind, path);
            metric!(counter("assets.fetch") += 1, "kind" => kind.as_str());
            let start = Instant::now();

            match transport.fetch(path).await {
                Ok(raw) => {
                    metric!(timer("assets.fetch.duration") = start.elapsed(), "kind" => kind.as_str());
                    metric!(time_raw("assets.fetch.size") = raw.len() as u64, "kind" => kind.as_str());
                    (raw, true)
                }
                Err(err) => {
                    tracing::debug!(
                        error = &err as &dyn std::error::Error,
                        "Failed to fetch asset {}",
                        path
                    );
                    metric!(counter("assets.fetch.failed") += 1, "reason" => err.metrics_tag());
                    return Computed::FetchFailed(err);
                }
            }
        }
    };

    let resolved = match kind {
        AssetKind::Binary => Ok(Asset::Binary(raw.clone())),
        AssetKind::Image => {
            metric!(counter("assets.decode") += 1);
            let start = Instant::now();

            let decoded = decoder.decode(raw.clone()).await;
            metric!(timer("assets.decode.duration") = start.elapsed());

            decoded
                .map(|bitmap| Asset::Image(Arc::new(bitmap)))
                .inspect_err(|error| {
                    tracing::debug!(
                        error = error as &dyn std::error::Error,
                        "Failed to decode asset {}",
                        path
                    );
                    metric!(counter("assets.decode.failed") += 1);
                })
        }
    };

    if fetched {
        Computed::Fetched { raw, resolved }
    } else {
        Computed::Redecoded { raw, resolved }
    }
}

/// Owns the pending entry of a running computation.
///
/// The computation settles its result through [`settle`](Self::settle). If it never gets there,
/// because it panicked or the runtime shut down, dropping the guard clears the pending entry so
/// that the path does not stay pending forever. Cached contents are left alone.
struct PendingGuard {
    slots: Arc<Mutex<Slots>>,
    path: String,
    id: u64,
    settled: bool,
}

impl PendingGuard {
    /// Clears the pending entry and caches the outcome of the computation.
    fn settle(mut self, computed: Computed) -> LoadResult {
        let mut slots = lock(&self.slots);
        let path = self.path.as_str();

        let current = slots.is_current(path, self.id);
        debug_assert!(current, "pending entry for {path} was replaced");
        if current {
            slots.pending.remove(path);
        }

        let result = match computed {
            Computed::FetchFailed(error) => Err(error),
            Computed::Fetched { raw, resolved } => {
                // Fetches populate the cache even if the path was removed in the meantime.
                slots.cache.insert(path.to_owned(), raw.clone());
                slots.store_decoded(path, &raw, &resolved);
                metric!(gauge("assets.cached") = slots.cache.len() as u64);
                resolved
            }
            Computed::Redecoded { raw, resolved } => {
                // The contents may have been removed or replaced while decoding.
                let unchanged = slots
                    .cache
                    .get(path)
                    .is_some_and(|cached| same_buffer(cached, &raw));
                if unchanged {
                    slots.store_decoded(path, &raw, &resolved);
                }
                resolved
            }
        };
        drop(slots);

        self.settled = true;
        result
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let mut slots = lock(&self.slots);
        if slots.is_current(&self.path, self.id) {
            tracing::error!("Computation for {} ended without a result", self.path);
            slots.pending.remove(&self.path);
        }
    }
}
