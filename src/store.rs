//! # Register Store
//!
//! In-memory data model of the slave: four fixed-capacity tables addressed
//! from zero.
//!
//! | Table | Cell | Access |
//! |-------|------|--------|
//! | Discrete Inputs | 1 bit | read-only |
//! | Coils | 1 bit | read-write |
//! | Input Registers | 16 bit | read-only |
//! | Holding Registers | 16 bit | read-write |
//!
//! All four tables sit behind one lock. A request touching a range of
//! addresses copies the whole range while holding it, so a concurrent
//! writer can never be observed half-applied. The lock is never held
//! across network I/O.

use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::ModbusException;

/// Table identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Read-only bits
    DiscreteInputs,
    /// Read-write bits
    Coils,
    /// Read-only 16-bit registers
    InputRegisters,
    /// Read-write 16-bit registers
    HoldingRegisters,
}

impl Table {
    /// All tables, in function-code order of their read requests.
    pub const ALL: [Table; 4] = [
        Table::Coils,
        Table::DiscreteInputs,
        Table::HoldingRegisters,
        Table::InputRegisters,
    ];

    /// Whether client requests may write this table
    #[inline]
    pub fn is_writable(self) -> bool {
        matches!(self, Self::Coils | Self::HoldingRegisters)
    }

    /// Whether cells hold a single bit
    #[inline]
    pub fn is_bit(self) -> bool {
        matches!(self, Self::Coils | Self::DiscreteInputs)
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::DiscreteInputs => "discrete inputs",
            Self::Coils => "coils",
            Self::InputRegisters => "input registers",
            Self::HoldingRegisters => "holding registers",
        }
    }
}

#[derive(Debug)]
struct Tables {
    discrete_inputs: Vec<u16>,
    coils: Vec<u16>,
    input_registers: Vec<u16>,
    holding_registers: Vec<u16>,
}

impl Tables {
    fn zeroed(capacity: usize) -> Self {
        Self {
            discrete_inputs: vec![0; capacity],
            coils: vec![0; capacity],
            input_registers: vec![0; capacity],
            holding_registers: vec![0; capacity],
        }
    }

    fn get(&self, table: Table) -> &[u16] {
        match table {
            Table::DiscreteInputs => &self.discrete_inputs,
            Table::Coils => &self.coils,
            Table::InputRegisters => &self.input_registers,
            Table::HoldingRegisters => &self.holding_registers,
        }
    }

    fn get_mut(&mut self, table: Table) -> &mut [u16] {
        match table {
            Table::DiscreteInputs => &mut self.discrete_inputs,
            Table::Coils => &mut self.coils,
            Table::InputRegisters => &mut self.input_registers,
            Table::HoldingRegisters => &mut self.holding_registers,
        }
    }
}

/// Shared register store.
///
/// Cloning is cheap and yields a handle to the same tables.
///
/// # Example
///
/// ```rust
/// use floor_modbus::{RegisterStore, Table};
///
/// let store = RegisterStore::new(100);
/// store.write(Table::HoldingRegisters, 0, &[42, 7]).unwrap();
/// assert_eq!(store.read(Table::HoldingRegisters, 0, 2).unwrap(), vec![42, 7]);
/// ```
#[derive(Debug, Clone)]
pub struct RegisterStore {
    tables: Arc<Mutex<Tables>>,
    capacity: usize,
}

impl RegisterStore {
    /// Allocate four zero-filled tables of `capacity` entries each.
    pub fn new(capacity: usize) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::zeroed(capacity))),
            capacity,
        }
    }

    /// Entries per table
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pre-load any table, read-only ones included, before the store is
    /// handed to the server.
    pub fn with_values(
        self,
        table: Table,
        start_address: u16,
        values: &[u16],
    ) -> Result<Self, ModbusException> {
        let range = self.check_range(start_address, values.len())?;
        check_values(table, values)?;
        debug!(
            "Seeding {} {}..{}",
            table.name(),
            range.start,
            range.end
        );
        self.tables.lock().get_mut(table)[range].copy_from_slice(values);
        Ok(self)
    }

    /// Read `count` values starting at `start_address`, in ascending order.
    pub fn read(
        &self,
        table: Table,
        start_address: u16,
        count: usize,
    ) -> Result<Vec<u16>, ModbusException> {
        let range = self.check_range(start_address, count)?;
        let tables = self.tables.lock();
        Ok(tables.get(table)[range].to_vec())
    }

    /// Replace the addressed slice with `values`.
    ///
    /// Nothing is written unless the whole request is valid.
    pub fn write(
        &self,
        table: Table,
        start_address: u16,
        values: &[u16],
    ) -> Result<(), ModbusException> {
        if !table.is_writable() {
            return Err(ModbusException::IllegalFunction);
        }
        let range = self.check_range(start_address, values.len())?;
        check_values(table, values)?;
        self.tables.lock().get_mut(table)[range].copy_from_slice(values);
        Ok(())
    }

    /// Read a bit table as booleans.
    pub fn read_bits(
        &self,
        table: Table,
        start_address: u16,
        count: usize,
    ) -> Result<Vec<bool>, ModbusException> {
        if !table.is_bit() {
            return Err(ModbusException::IllegalFunction);
        }
        let values = self.read(table, start_address, count)?;
        Ok(values.into_iter().map(|v| v != 0).collect())
    }

    /// Write booleans to a bit table.
    pub fn write_bits(
        &self,
        table: Table,
        start_address: u16,
        values: &[bool],
    ) -> Result<(), ModbusException> {
        if !table.is_bit() {
            return Err(ModbusException::IllegalFunction);
        }
        let raw: Vec<u16> = values.iter().map(|&b| u16::from(b)).collect();
        self.write(table, start_address, &raw)
    }

    /// Write holding registers then read holding registers under one lock
    /// acquisition.
    pub fn write_read_registers(
        &self,
        write_address: u16,
        values: &[u16],
        read_address: u16,
        read_count: usize,
    ) -> Result<Vec<u16>, ModbusException> {
        let write_range = self.check_range(write_address, values.len())?;
        let read_range = self.check_range(read_address, read_count)?;

        let mut tables = self.tables.lock();
        let holding = tables.get_mut(Table::HoldingRegisters);
        holding[write_range].copy_from_slice(values);
        Ok(holding[read_range].to_vec())
    }

    fn check_range(&self, start_address: u16, count: usize) -> Result<Range<usize>, ModbusException> {
        if count == 0 {
            return Err(ModbusException::IllegalDataValue);
        }
        let start = start_address as usize;
        let end = start
            .checked_add(count)
            .filter(|&end| end <= self.capacity)
            .ok_or(ModbusException::IllegalDataAddress)?;
        Ok(start..end)
    }
}

fn check_values(table: Table, values: &[u16]) -> Result<(), ModbusException> {
    if table.is_bit() && values.iter().any(|&v| v > 1) {
        return Err(ModbusException::IllegalDataValue);
    }
    Ok(())
}
