//! # Sorted Indexes
//!
//! Binary search helpers and the address → line index.
//!
//! Every lookup in this crate that maps a runtime position onto decoded data
//! goes through [`floor_index`]: an exact hit gives its own index, a miss
//! gives the nearest *preceding* element, and a query below the first key
//! finds nothing.

use smallvec::SmallVec;

use crate::dwarf::LineRow;
use crate::types::Address;

/// Binary search `items` (sorted by `key_fn`) for `key`.
///
/// Same contract as [`slice::binary_search_by_key`]: `Ok(index)` on a hit,
/// `Err(insertion_point)` on a miss.
pub fn search_by_key<T, K, F>(items: &[T], key: &K, key_fn: F) -> Result<usize, usize>
where
    K: Ord,
    F: FnMut(&T) -> K,
{
    items.binary_search_by_key(key, key_fn)
}

/// Turn a search result into the index of the greatest key `<=` the query.
///
/// ```rust
/// use wasmdbg_core::index::floor_index;
///
/// let keys = [10, 20, 30];
/// assert_eq!(floor_index(keys.binary_search(&20)), Some(1));
/// assert_eq!(floor_index(keys.binary_search(&25)), Some(1));
/// assert_eq!(floor_index(keys.binary_search(&5)), None);
/// assert_eq!(floor_index(keys.binary_search(&99)), Some(2));
/// ```
pub fn floor_index(search: Result<usize, usize>) -> Option<usize>
{
    match search {
        Ok(index) => Some(index),
        Err(insertion) => insertion.checked_sub(1),
    }
}

/// Floor lookup over `items` sorted by `key_fn`.
pub fn floor_by_key<T, K, F>(items: &[T], key: &K, key_fn: F) -> Option<usize>
where
    K: Ord,
    F: FnMut(&T) -> K,
{
    floor_index(search_by_key(items, key, key_fn))
}

/// All rows sharing one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry
{
    pub address: Address,
    /// Indices into the row list the index was built from
    pub rows: SmallVec<[usize; 2]>,
}

/// Address → line rows, sorted by address.
///
/// End-of-sequence rows are left out: they mark the first address *past* a
/// sequence and do not describe any instruction.
#[derive(Debug, Clone, Default)]
pub struct AddressIndex
{
    entries: Vec<AddressEntry>,
}

impl AddressIndex
{
    pub fn build(rows: &[LineRow]) -> Self
    {
        let mut pairs: Vec<(Address, usize)> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.end_sequence)
            .map(|(index, row)| (row.address, index))
            .collect();
        pairs.sort_by_key(|(address, _)| *address);

        let mut entries: Vec<AddressEntry> = Vec::new();
        for (address, row) in pairs {
            match entries.last_mut() {
                Some(last) if last.address == address => last.rows.push(row),
                _ => entries.push(AddressEntry {
                    address,
                    rows: SmallVec::from_elem(row, 1),
                }),
            }
        }
        Self { entries }
    }

    /// Entry with the greatest address `<=` `address`.
    pub fn floor(&self, address: Address) -> Option<&AddressEntry>
    {
        floor_by_key(&self.entries, &address, |entry| entry.address).map(|index| &self.entries[index])
    }

    /// Entry at exactly `address`.
    pub fn exact(&self, address: Address) -> Option<&AddressEntry>
    {
        search_by_key(&self.entries, &address, |entry| entry.address)
            .ok()
            .map(|index| &self.entries[index])
    }

    /// `file:line` of every row at the floor of `address`, joined with `;`.
    ///
    /// Two positions belong to the same source line exactly when their keys
    /// are equal.
    pub fn line_key(&self, rows: &[LineRow], address: Address) -> Option<String>
    {
        let entry = self.floor(address)?;
        let keys: Vec<String> = entry
            .rows
            .iter()
            .filter_map(|index| rows.get(*index))
            .map(|row| format!("{}:{}", row.file, row.line))
            .collect();
        Some(keys.join(";"))
    }

    pub fn entries(&self) -> &[AddressEntry]
    {
        &self.entries
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn row(address: u64, line: u64, end_sequence: bool) -> LineRow
    {
        LineRow {
            address: Address::new(address),
            op_index: 0,
            file: "./a.c".to_string(),
            line,
            column: 0,
            is_stmt: true,
            basic_block: false,
            end_sequence,
            prologue_end: false,
            epilogue_begin: false,
            isa: 0,
            discriminator: 0,
        }
    }

    #[test]
    fn test_groups_rows_by_address()
    {
        let rows = [row(0x20, 3, false), row(0x10, 1, false), row(0x10, 2, false), row(0x30, 3, true)];
        let index = AddressIndex::build(&rows);
        assert_eq!(index.len(), 2);
        assert_eq!(index.entries()[0].rows.as_slice(), &[1, 2]);
        assert_eq!(index.line_key(&rows, Address::new(0x18)).unwrap(), "./a.c:1;./a.c:2");
        assert_eq!(index.line_key(&rows, Address::new(0x40)).unwrap(), "./a.c:3");
        assert!(index.floor(Address::new(0x0f)).is_none());
        assert!(index.exact(Address::new(0x18)).is_none());
    }
}
