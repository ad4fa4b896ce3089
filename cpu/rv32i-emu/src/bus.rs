use crate::traits::BusInterface;
use std::collections::BTreeMap;

/// Program ROM plus sparse word-addressed data RAM.
///
/// Unaligned loads read zero and unaligned stores are dropped, matching the
/// simple memory model the interpreter targets.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBus {
    program: Vec<u32>,
    data: BTreeMap<u32, u32>,
}

impl InMemoryBus {
    pub fn new(program: Vec<u32>) -> Self {
        Self { program, data: BTreeMap::new() }
    }

    /// Words currently stored in `[base, base + 4 * count)`, absent words
    /// reading as zero.
    pub fn data_region(&self, base: u32, count: u32) -> Vec<(u32, u32)> {
        (0..count)
            .map(|i| {
                let address = base.wrapping_add(4 * i);
                (address, self.data.get(&address).copied().unwrap_or(0))
            })
            .collect()
    }
}

impl BusInterface for InMemoryBus {
    fn fetch(&mut self, pc: u32) -> u32 {
        self.program.get((pc / 4) as usize).copied().unwrap_or(0)
    }

    fn load_word(&mut self, address: u32) -> u32 {
        if address % 4 != 0 {
            return 0;
        }
        self.data.get(&address).copied().unwrap_or(0)
    }

    fn store_word(&mut self, address: u32, value: u32) {
        if address % 4 != 0 {
            log::debug!("dropping unaligned store to {address:08X}");
            return;
        }
        self.data.insert(address, value);
    }
}
