/// Word-granularity memory access as seen by the CPU core.
pub trait BusInterface {
    /// Read the instruction word at `pc`.
    fn fetch(&mut self, pc: u32) -> u32;

    fn load_word(&mut self, address: u32) -> u32;

    fn store_word(&mut self, address: u32, value: u32);
}
