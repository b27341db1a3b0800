//! Raw node id conversion.
//!
//! The simulator assigns globally unique ids; every population occupies the
//! contiguous range `[first, last]`. Downstream code indexes matrix rows by
//! population-local ids in `[0, N)`.

use meso_core::{
    AnalysisError, NodeId, Population, PositionRecord, Result, SortKey, SpikeRecord, Time,
};
use serde::{Deserialize, Serialize};

/// Global id range of one population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIdRange {
    pub first: u64,
    pub last: u64,
}

impl RawIdRange {
    pub fn new(first: u64, last: u64) -> Self {
        Self { first, last }
    }

    pub fn len(&self) -> usize {
        if self.last < self.first {
            0
        } else {
            (self.last - self.first + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, raw: u64) -> bool {
        raw >= self.first && raw <= self.last
    }

    pub fn to_local(&self, raw: u64) -> Result<NodeId> {
        if !self.contains(raw) {
            return Err(AnalysisError::DataConsistency(format!(
                "raw node id {raw} outside population range [{}, {}]",
                self.first, self.last
            )));
        }
        Ok((raw - self.first) as NodeId)
    }
}

/// First and last raw id of every population, in population order.
///
/// Read once before any task starts and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIdTable {
    ranges: Vec<RawIdRange>,
}

impl RawIdTable {
    pub fn new(ranges: Vec<RawIdRange>) -> Self {
        Self { ranges }
    }

    /// Parse whitespace separated `first last` lines; `#` starts a comment.
    pub fn parse(text: &str) -> Result<Self> {
        let mut ranges = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 2 {
                return Err(AnalysisError::ParseError(format!(
                    "node id table line {}: expected 2 columns, got {}",
                    lineno + 1,
                    fields.len()
                )));
            }
            let parse = |s: &str| {
                s.parse::<u64>().map_err(|e| {
                    AnalysisError::ParseError(format!(
                        "node id table line {}: '{s}': {e}",
                        lineno + 1
                    ))
                })
            };
            ranges.push(RawIdRange::new(parse(fields[0])?, parse(fields[1])?));
        }
        Ok(Self { ranges })
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn get(&self, population_index: usize) -> Result<&RawIdRange> {
        self.ranges.get(population_index).ok_or_else(|| {
            AnalysisError::DataConsistency(format!(
                "node id table has {} rows, population index {population_index} requested",
                self.ranges.len()
            ))
        })
    }

    pub fn ranges(&self) -> &[RawIdRange] {
        &self.ranges
    }
}

/// Converts raw records of one population to local ids and analysis time.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierRemapper<'a> {
    range: &'a RawIdRange,
    t_presim: Time,
}

impl<'a> IdentifierRemapper<'a> {
    pub fn new(range: &'a RawIdRange, t_presim: Time) -> Self {
        Self { range, t_presim }
    }

    /// `(raw_id, time_ms)` rows → local ids, warm-up removed, sorted.
    pub fn remap_spikes(&self, raw: &[(u64, Time)], sortby: SortKey) -> Result<SpikeRecord> {
        let mut record = SpikeRecord::new();
        record.events.reserve(raw.len());
        for &(raw_id, time) in raw {
            record.record(self.range.to_local(raw_id)?, time - self.t_presim);
        }
        record.sort_by_key(sortby);
        Ok(record)
    }

    /// `(raw_id, x, y)` rows → positions indexed by local id.
    pub fn remap_positions(&self, raw: &[(u64, f64, f64)]) -> Result<PositionRecord> {
        let rows = raw
            .iter()
            .map(|&(raw_id, x, y)| Ok((self.range.to_local(raw_id)?, x, y)))
            .collect::<Result<Vec<_>>>()?;
        PositionRecord::from_rows(rows)
    }
}

/// Converted neuron counts must equal the configured network sizes.
pub fn check_neuron_counts(populations: &[Population], converted: &[usize]) -> Result<()> {
    if populations.len() != converted.len() {
        return Err(AnalysisError::DataConsistency(format!(
            "{} populations configured, {} converted",
            populations.len(),
            converted.len()
        )));
    }
    let mismatched: Vec<String> = populations
        .iter()
        .zip(converted)
        .filter(|(p, n)| p.size != **n)
        .map(|(p, n)| format!("{}: expected {}, found {}", p.name, p.size, n))
        .collect();
    if !mismatched.is_empty() {
        return Err(AnalysisError::DataConsistency(format!(
            "neuron numbers do not match ({})",
            mismatched.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_id_table_parse() {
        let table = RawIdTable::parse("1 100\n# comment\n101\t125\n\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap().len(), 25);
        assert!(table.get(2).is_err());
        assert!(RawIdTable::parse("1 2 3").is_err());
        assert!(RawIdTable::parse("a 2").is_err());
    }

    #[test]
    fn test_remap_spikes() {
        let range = RawIdRange::new(101, 110);
        let remapper = IdentifierRemapper::new(&range, 500.0);
        let rec = remapper
            .remap_spikes(&[(105, 612.5), (101, 501.0), (110, 501.0)], SortKey::Time)
            .unwrap();
        let pairs: Vec<_> = rec.events.iter().map(|e| (e.node_id, e.time_ms)).collect();
        assert_eq!(pairs, vec![(0, 1.0), (9, 1.0), (4, 112.5)]);

        assert!(remapper.remap_spikes(&[(111, 600.0)], SortKey::Time).is_err());
    }

    #[test]
    fn test_remap_positions() {
        let range = RawIdRange::new(11, 13);
        let remapper = IdentifierRemapper::new(&range, 0.0);
        let pos = remapper
            .remap_positions(&[(13, 0.3, 0.3), (11, 0.1, 0.1), (12, 0.2, 0.2)])
            .unwrap();
        assert_eq!(pos.x, vec![0.1, 0.2, 0.3]);

        // missing neuron
        assert!(remapper.remap_positions(&[(11, 0.0, 0.0), (13, 0.0, 0.0)]).is_err());
    }

    #[test]
    fn test_check_neuron_counts() {
        let pops = vec![Population::new("E", 4), Population::new("I", 1)];
        check_neuron_counts(&pops, &[4, 1]).unwrap();
        let err = check_neuron_counts(&pops, &[4, 2]);
        assert!(matches!(err, Err(AnalysisError::DataConsistency(_))));
    }
}
