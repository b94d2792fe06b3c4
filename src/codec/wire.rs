//! Binary envelope codec for ingress snapshots
//!
//! Wire layout (little-endian, variable length):
//!
//! ```text
//! u8  msg_type                  1 = order book snapshot, others are skipped
//! u8  symbol_len                followed by that many ASCII bytes
//! u64 seq
//! u64 recent_trade_price        scaled integer, 0 = no trade yet
//! u64 recent_trade_qty
//! u16 bid_level_count
//! u16 ask_level_count
//! per level: u64 price, u16 order_count, then order_count * u64 qty
//! ```
//!
//! `Envelope::parse` performs one bounds-checked validation walk over the
//! payload; after it returns, every accessor on the views is infallible and
//! zero-copy.

use crate::error::DecodeError;

/// Message type tag designating an order book snapshot
pub const MSG_ORDER_BOOK_SNAPSHOT: u8 = 1;

const LEVEL_HEADER_LEN: usize = 10; // u64 price + u16 order_count

/// Parsed envelope over a borrowed payload
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    msg_type: u8,
    snapshot: Option<SnapshotView<'a>>,
}

impl<'a> Envelope<'a> {
    /// Validate and parse a payload
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }
        let msg_type = data[0];
        if msg_type != MSG_ORDER_BOOK_SNAPSHOT {
            return Ok(Self {
                msg_type,
                snapshot: None,
            });
        }

        let (symbol, mut offset) = read_symbol(data)?;
        need(data, offset, 8 * 3 + 2 * 2)?;
        let seq = read_u64(data, offset);
        let recent_trade_price = read_u64(data, offset + 8);
        let recent_trade_qty = read_u64(data, offset + 16);
        let bid_count = read_u16(data, offset + 24);
        let ask_count = read_u16(data, offset + 26);
        offset += 28;

        let levels_start = offset;
        for _ in 0..bid_count {
            offset = walk_level(data, offset)?;
        }
        let asks_at = offset - levels_start;
        for _ in 0..ask_count {
            offset = walk_level(data, offset)?;
        }

        Ok(Self {
            msg_type,
            snapshot: Some(SnapshotView {
                symbol,
                seq,
                recent_trade_price,
                recent_trade_qty,
                bid_count,
                ask_count,
                levels: &data[levels_start..offset],
                asks_at,
            }),
        })
    }

    /// Message type tag
    #[must_use]
    pub const fn msg_type(&self) -> u8 {
        self.msg_type
    }

    /// Snapshot view, present only for `MSG_ORDER_BOOK_SNAPSHOT` envelopes
    #[must_use]
    pub const fn snapshot(&self) -> Option<SnapshotView<'a>> {
        self.snapshot
    }
}

/// Header fields read without walking the level data
#[derive(Debug, Clone, Copy)]
pub struct Peek<'a> {
    /// Message type tag
    pub msg_type: u8,
    /// Symbol, present for snapshot envelopes
    pub symbol: Option<&'a str>,
}

/// Read only the message type and symbol, for dispatch decisions
pub fn peek(data: &[u8]) -> Result<Peek<'_>, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    let msg_type = data[0];
    if msg_type != MSG_ORDER_BOOK_SNAPSHOT {
        return Ok(Peek {
            msg_type,
            symbol: None,
        });
    }
    let (symbol, _) = read_symbol(data)?;
    Ok(Peek {
        msg_type,
        symbol: Some(symbol),
    })
}

/// Zero-copy view over a decoded snapshot
#[derive(Debug, Clone, Copy)]
pub struct SnapshotView<'a> {
    symbol: &'a str,
    seq: u64,
    recent_trade_price: u64,
    recent_trade_qty: u64,
    bid_count: u16,
    ask_count: u16,
    levels: &'a [u8],
    asks_at: usize,
}

impl<'a> SnapshotView<'a> {
    /// Symbol the snapshot belongs to
    #[must_use]
    pub const fn symbol(&self) -> &'a str {
        self.symbol
    }

    /// Sequence number
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Most recent trade price, 0 when unknown
    #[must_use]
    pub const fn recent_trade_price(&self) -> u64 {
        self.recent_trade_price
    }

    /// Most recent trade quantity
    #[must_use]
    pub const fn recent_trade_qty(&self) -> u64 {
        self.recent_trade_qty
    }

    /// Buy side levels in input order
    #[must_use]
    pub fn buy_side(&self) -> LevelIter<'a> {
        LevelIter {
            data: &self.levels[..self.asks_at],
            offset: 0,
            remaining: self.bid_count,
        }
    }

    /// Sell side levels in input order
    #[must_use]
    pub fn sell_side(&self) -> LevelIter<'a> {
        LevelIter {
            data: &self.levels[self.asks_at..],
            offset: 0,
            remaining: self.ask_count,
        }
    }
}

/// Iterator over the levels of one side
#[derive(Debug, Clone)]
pub struct LevelIter<'a> {
    data: &'a [u8],
    offset: usize,
    remaining: u16,
}

impl<'a> Iterator for LevelIter<'a> {
    type Item = LevelView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.offset + LEVEL_HEADER_LEN > self.data.len() {
            return None;
        }
        let price = read_u64(self.data, self.offset);
        let order_count = usize::from(read_u16(self.data, self.offset + 8));
        let qtys_start = self.offset + LEVEL_HEADER_LEN;
        let qtys_end = qtys_start + order_count * 8;
        if qtys_end > self.data.len() {
            return None;
        }
        self.offset = qtys_end;
        self.remaining -= 1;
        Some(LevelView {
            price,
            qtys: &self.data[qtys_start..qtys_end],
        })
    }
}

/// Zero-copy view over one price level
#[derive(Debug, Clone, Copy)]
pub struct LevelView<'a> {
    price: u64,
    qtys: &'a [u8],
}

impl<'a> LevelView<'a> {
    /// Price in scaled integer format
    #[must_use]
    pub const fn price(&self) -> u64 {
        self.price
    }

    /// Number of orders resting at this level
    #[must_use]
    pub fn order_count(&self) -> u32 {
        (self.qtys.len() / 8) as u32
    }

    /// Quantities of the orders at this level, in input order
    pub fn order_qtys(&self) -> impl Iterator<Item = u64> + 'a {
        let qtys = self.qtys;
        (0..qtys.len() / 8).map(move |i| read_u64(qtys, i * 8))
    }
}

/// Encode a snapshot envelope
///
/// Each level is `(price, order quantities)`. Used by upstream feeders and
/// the test suite; symbols longer than 255 bytes are truncated.
#[must_use]
pub fn encode_snapshot(
    symbol: &str,
    seq: u64,
    recent_trade_price: u64,
    recent_trade_qty: u64,
    bids: &[(u64, Vec<u64>)],
    asks: &[(u64, Vec<u64>)],
) -> Vec<u8> {
    let symbol = &symbol.as_bytes()[..symbol.len().min(usize::from(u8::MAX))];
    let mut out = Vec::with_capacity(32 + symbol.len() + (bids.len() + asks.len()) * 24);
    out.push(MSG_ORDER_BOOK_SNAPSHOT);
    out.push(symbol.len() as u8);
    out.extend_from_slice(symbol);
    out.extend_from_slice(&seq.to_le_bytes());
    out.extend_from_slice(&recent_trade_price.to_le_bytes());
    out.extend_from_slice(&recent_trade_qty.to_le_bytes());
    out.extend_from_slice(&(bids.len() as u16).to_le_bytes());
    out.extend_from_slice(&(asks.len() as u16).to_le_bytes());
    for (price, qtys) in bids.iter().chain(asks.iter()) {
        out.extend_from_slice(&price.to_le_bytes());
        out.extend_from_slice(&(qtys.len() as u16).to_le_bytes());
        for qty in qtys {
            out.extend_from_slice(&qty.to_le_bytes());
        }
    }
    out
}

/// Encode a minimal non-snapshot envelope carrying only a type tag
#[must_use]
pub fn encode_message(msg_type: u8) -> Vec<u8> {
    vec![msg_type]
}

fn read_symbol(data: &[u8]) -> Result<(&str, usize), DecodeError> {
    need(data, 1, 1)?;
    let symbol_len = usize::from(data[1]);
    if symbol_len == 0 {
        return Err(DecodeError::EmptySymbol);
    }
    need(data, 2, symbol_len)?;
    let symbol =
        std::str::from_utf8(&data[2..2 + symbol_len]).map_err(|_| DecodeError::BadSymbol)?;
    Ok((symbol, 2 + symbol_len))
}

fn walk_level(data: &[u8], at: usize) -> Result<usize, DecodeError> {
    need(data, at, LEVEL_HEADER_LEN)?;
    let order_count = usize::from(read_u16(data, at + 8));
    let end = at + LEVEL_HEADER_LEN + order_count * 8;
    need(data, at + LEVEL_HEADER_LEN, order_count * 8)?;
    Ok(end)
}

fn need(data: &[u8], at: usize, len: usize) -> Result<(), DecodeError> {
    if at + len > data.len() {
        return Err(DecodeError::Truncated {
            offset: at,
            needed: len,
            len: data.len(),
        });
    }
    Ok(())
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    u64::from_le_bytes([
        data[at],
        data[at + 1],
        data[at + 2],
        data[at + 3],
        data[at + 4],
        data[at + 5],
        data[at + 6],
        data[at + 7],
    ])
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}
