use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// One submit slot per fee payer
///
/// Holders of the same payer's slot run one at a time in FIFO order; slots
/// of different payers never contend. Dropping the guard releases the slot,
/// so an abandoned execution cannot wedge later ones.
#[derive(Debug, Default)]
pub struct SubmitSlots {
    slots: DashMap<Pubkey, Arc<Mutex<()>>>,
}

pub type SlotGuard = OwnedMutexGuard<()>;

impl SubmitSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, payer: &Pubkey) -> SlotGuard {
        // Clone the Arc out so the map shard is unlocked while we wait
        let slot = self.slots.entry(*payer).or_default().clone();
        if slot.try_lock().is_err() {
            debug!(payer = %payer, "Waiting for fee payer submit slot");
        }
        slot.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_payer_is_exclusive() {
        let slots = Arc::new(SubmitSlots::new());
        let payer = Pubkey::new_unique();

        let guard = slots.acquire(&payer).await;
        let waiter = {
            let slots = slots.clone();
            tokio::spawn(async move {
                let _g = slots.acquire(&payer).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert_eq!(slots.len(), 1);
    }

    #[tokio::test]
    async fn test_different_payers_do_not_contend() {
        let slots = SubmitSlots::new();
        let _a = slots.acquire(&Pubkey::new_unique()).await;
        let _b = slots.acquire(&Pubkey::new_unique()).await;
        assert_eq!(slots.len(), 2);
    }
}
