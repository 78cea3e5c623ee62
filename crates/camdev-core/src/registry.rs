// ── Client registry ──
//
// One ONVIF client and one vendor client per camera address. The mutex
// only guards map membership; construction runs outside it on a per-address
// `OnceCell`, so concurrent first requests for the same camera share one
// client and requests for different cameras never wait on each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camdev_api::OnvifClient;
use tokio::sync::OnceCell;

use crate::error::CoreError;
use crate::vendor::VendorClient;

type Slot<T> = Arc<OnceCell<Arc<T>>>;
type SlotMap<T> = HashMap<String, Slot<T>>;

#[derive(Default)]
struct Slots {
    onvif: SlotMap<OnvifClient>,
    vendor: SlotMap<VendorClient>,
}

#[derive(Default)]
pub struct ClientRegistry {
    slots: Mutex<Slots>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── ONVIF ────────────────────────────────────────────────────────

    pub fn onvif(&self, address: &str) -> Option<Arc<OnvifClient>> {
        get(&self.lock().onvif, address)
    }

    /// The ONVIF client for `address`, built with `init` if absent.
    pub async fn onvif_or_try_init<F, Fut>(&self, address: &str, init: F) -> Result<Arc<OnvifClient>, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<OnvifClient, CoreError>>,
    {
        let slot = slot(&mut self.lock().onvif, address);
        get_or_try_init(&slot, init).await
    }

    pub fn remove_onvif(&self, address: &str) -> Option<Arc<OnvifClient>> {
        take(&mut self.lock().onvif, address)
    }

    // ── Vendor ───────────────────────────────────────────────────────

    pub fn vendor(&self, address: &str) -> Option<Arc<VendorClient>> {
        get(&self.lock().vendor, address)
    }

    /// The vendor client for `address`, built with `init` if absent.
    pub async fn vendor_or_try_init<F, Fut>(&self, address: &str, init: F) -> Result<Arc<VendorClient>, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<VendorClient, CoreError>>,
    {
        let slot = slot(&mut self.lock().vendor, address);
        get_or_try_init(&slot, init).await
    }

    pub fn remove_vendor(&self, address: &str) -> Option<Arc<VendorClient>> {
        take(&mut self.lock().vendor, address)
    }

    /// Empty both maps, returning the vendor clients that were running.
    pub fn drain(&self) -> Vec<Arc<VendorClient>> {
        let mut slots = self.lock();
        slots.onvif.clear();
        slots
            .vendor
            .drain()
            .filter_map(|(_, slot)| slot.get().cloned())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn get<T>(map: &SlotMap<T>, address: &str) -> Option<Arc<T>> {
    map.get(address).and_then(|slot| slot.get().cloned())
}

fn slot<T>(map: &mut SlotMap<T>, address: &str) -> Slot<T> {
    Arc::clone(map.entry(address.to_owned()).or_default())
}

fn take<T>(map: &mut SlotMap<T>, address: &str) -> Option<Arc<T>> {
    map.remove(address).and_then(|slot| slot.get().cloned())
}

async fn get_or_try_init<T, F, Fut>(slot: &Slot<T>, init: F) -> Result<Arc<T>, CoreError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    slot.get_or_try_init(|| async move { init().await.map(Arc::new) })
        .await
        .cloned()
}
