use async_trait::async_trait;
use serde_json::json;

use proxtree_core::error::SourceError;
use proxtree_core::model::{Item, ItemId, ItemStatus};
use proxtree_core::source::ItemSource;

/// A small demo fleet whose state drifts from tick to tick: machines start
/// and stop, one goes missing now and then, and the metrics wobble.
/// Deterministic in the tick counter so runs are reproducible.
pub struct SimulatedSource {
    fleet: Vec<(ItemId, &'static str)>,
    tick_counter: u64,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self {
            fleet: vec![
                (100, "api-gateway"),
                (101, "api-worker"),
                (110, "postgres-primary"),
                (111, "postgres-replica"),
                (120, "redis-cache"),
                (130, "ci-runner"),
                (140, "backup"),
                (150, "dev-sandbox"),
            ],
            tick_counter: 0,
        }
    }

    fn status_for(&self, index: usize, id: ItemId) -> ItemStatus {
        let tick = self.tick_counter;
        match id {
            // batch machines flip every few ticks
            130 if tick % 6 >= 3 => ItemStatus::Stopped,
            140 if tick % 10 != 4 => ItemStatus::Stopped,
            150 if tick % 9 == 5 => ItemStatus::Other("paused".into()),
            150 => ItemStatus::Stopped,
            _ if index % 3 == 1 && tick % 15 == 7 => ItemStatus::Stopped,
            _ => ItemStatus::Running,
        }
    }

    fn snapshot(&self) -> Vec<Item> {
        let tick = self.tick_counter;
        self.fleet
            .iter()
            .enumerate()
            // the replica drops off the list for one tick in eight
            .filter(|(_, (id, _))| !(*id == 111 && tick % 8 == 6))
            .map(|(index, (id, name))| {
                let status = self.status_for(index, *id);
                let mut item = Item::new(*id, *name, status.clone());
                if status.is_running() {
                    let (base_cpu, base_mem) = match *name {
                        n if n.starts_with("api") => (0.12, 1_500_000_000u64),
                        n if n.starts_with("postgres") => (0.08, 4_096_000_000u64),
                        n if n.starts_with("redis") => (0.03, 512_000_000u64),
                        _ => (0.05, 1_024_000_000u64),
                    };
                    let cpu: f64 = base_cpu + (tick % 10) as f64 * 0.015;
                    let mem = base_mem + (tick % 20) * 1_000_000;
                    item.extra.insert("cpu".into(), json!(cpu));
                    item.extra.insert("mem".into(), json!(mem));
                    item.extra.insert("uptime".into(), json!(tick * 60));
                }
                item
            })
            .collect()
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemSource for SimulatedSource {
    async fn fetch(&mut self) -> Result<Vec<Item>, SourceError> {
        self.tick_counter += 1;
        Ok(self.snapshot())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
