/// Closed key spaces for the market-data plane
///
/// Instruments and markets are small fixed enumerations with dense ordinals,
/// so every per-pair structure can be a flat pre-allocated table instead of a
/// map. Lookups index by ordinal and cannot miss, and no code path needs an
/// absent-cell check.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    GbpUsd,
    EurUsd,
    EurSek,
    UsdJpy,
}

impl Instrument {
    pub const COUNT: usize = 4;

    pub const ALL: [Instrument; Instrument::COUNT] = [
        Instrument::GbpUsd,
        Instrument::EurUsd,
        Instrument::EurSek,
        Instrument::UsdJpy,
    ];

    /// Dense ordinal, stable across the lifetime of the process
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(v: usize) -> Option<Self> {
        match v {
            0 => Some(Instrument::GbpUsd),
            1 => Some(Instrument::EurUsd),
            2 => Some(Instrument::EurSek),
            3 => Some(Instrument::UsdJpy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Instrument::GbpUsd => "GBPUSD",
            Instrument::EurUsd => "EURUSD",
            Instrument::EurSek => "EURSEK",
            Instrument::UsdJpy => "USDJPY",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    Ebs,
    Lseg,
    Currenex,
    Hotspot,
}

impl Market {
    pub const COUNT: usize = 4;

    pub const ALL: [Market; Market::COUNT] = [
        Market::Ebs,
        Market::Lseg,
        Market::Currenex,
        Market::Hotspot,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(v: usize) -> Option<Self> {
        match v {
            0 => Some(Market::Ebs),
            1 => Some(Market::Lseg),
            2 => Some(Market::Currenex),
            3 => Some(Market::Hotspot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Ebs => "EBS",
            Market::Lseg => "LSEG",
            Market::Currenex => "CURRENEX",
            Market::Hotspot => "HOTSPOT",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quote side tag carried on ticks. Informational only: aggregation reads the
/// bid and offer fields of the tick itself, never this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Offer,
}

impl Side {
    pub const COUNT: usize = 2;

    pub const ALL: [Side; Side::COUNT] = [Side::Bid, Side::Offer];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(v: usize) -> Option<Self> {
        match v {
            0 => Some(Side::Bid),
            1 => Some(Side::Offer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "BID",
            Side::Offer => "OFFER",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const PAIR_COUNT: usize = Instrument::COUNT * Market::COUNT;

/// Row-major cell index for an (instrument, market) pair
fn pair_index(instrument: Instrument, market: Market) -> usize {
    instrument.index() * Market::COUNT + market.index()
}

/// Iterate the full (instrument, market) cross product in ordinal order
pub fn pairs() -> impl Iterator<Item = (Instrument, Market)> {
    Instrument::ALL.into_iter().flat_map(|instrument| {
        Market::ALL
            .into_iter()
            .map(move |market| (instrument, market))
    })
}

/// Dense instrument x market table
///
/// Every cell exists from construction on; the table is never resized and a
/// lookup always lands on a live cell.
pub struct PairTable<T> {
    cells: Box<[T]>,
}

impl<T> PairTable<T> {
    /// Build a table by filling every cell in ordinal order
    pub fn from_fn(mut fill: impl FnMut(Instrument, Market) -> T) -> Self {
        let mut cells = Vec::with_capacity(PAIR_COUNT);
        for (instrument, market) in pairs() {
            cells.push(fill(instrument, market));
        }
        PairTable {
            cells: cells.into_boxed_slice(),
        }
    }

    pub fn get(&self, instrument: Instrument, market: Market) -> &T {
        &self.cells[pair_index(instrument, market)]
    }

    pub fn get_mut(&mut self, instrument: Instrument, market: Market) -> &mut T {
        &mut self.cells[pair_index(instrument, market)]
    }

    /// Iterate cells with their pair keys, in ordinal order
    pub fn iter(&self) -> impl Iterator<Item = (Instrument, Market, &T)> {
        pairs()
            .zip(self.cells.iter())
            .map(|((instrument, market), cell)| (instrument, market, cell))
    }
}

impl<T: Default> Default for PairTable<T> {
    fn default() -> Self {
        PairTable::from_fn(|_, _| T::default())
    }
}
