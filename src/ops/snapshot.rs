use crate::error::SweepError;
use crate::grid::raster::Raster;
use crate::grid::symbol::Symbol;
use crate::grid::view::SolverView;
use byteorder::ReadBytesExt;
use byteorder::BE;
use bytes::BufMut;
use bytes::BytesMut;
use std::io::Read;

/// signature header for the self-describing snapshot payload
const MAGIC: &[u8; 4] = b"RSWP";
const VERSION: u8 = 1;
/// footer marking end of payload
const FOOTER: u16 = 0xFFFF;

/// one persisted tick: the four grid arrays plus enough metadata to
/// rebuild an identical solver view
#[derive(Debug, Clone)]
pub struct TickSnapshot {
    pub tick: u64,
    pub view: SolverView,
}

impl TickSnapshot {
    /// binary layout: magic, version, tick, origin, dims, then the
    /// four arrays in declaration order, then the footer
    pub fn encode(&self) -> BytesMut {
        let width = self.view.symbols.width();
        let height = self.view.symbols.height();
        let mut buf = BytesMut::with_capacity(32 + width * height * 14);
        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);
        buf.put_u64(self.tick);
        buf.put_u64(self.view.last_update);
        buf.put_i32(self.view.origin.0);
        buf.put_i32(self.view.origin.1);
        buf.put_u32(width as u32);
        buf.put_u32(height as u32);
        for &symbol in self.view.symbols.values() {
            buf.put_i8(i8::from(symbol));
        }
        for &confidence in self.view.confidence.values() {
            buf.put_f32(confidence);
        }
        for &age in self.view.age.values() {
            buf.put_u64(age);
        }
        for &frontier in self.view.frontier.values() {
            buf.put_u8(frontier as u8);
        }
        buf.put_u16(FOOTER);
        buf
    }

    pub fn decode(mut payload: &[u8]) -> Result<Self, SweepError> {
        let reader = &mut payload;
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| SweepError::InvalidInput(e.to_string()))?;
        if &magic != MAGIC {
            return Err(SweepError::InvalidInput("bad snapshot magic".into()));
        }
        let version = reader.read_u8().map_err(Self::truncated)?;
        if version != VERSION {
            return Err(SweepError::InvalidInput(format!("unknown version {}", version)));
        }
        let tick = reader.read_u64::<BE>().map_err(Self::truncated)?;
        let last_update = reader.read_u64::<BE>().map_err(Self::truncated)?;
        let ox = reader.read_i32::<BE>().map_err(Self::truncated)?;
        let oy = reader.read_i32::<BE>().map_err(Self::truncated)?;
        let width = reader.read_u32::<BE>().map_err(Self::truncated)? as usize;
        let height = reader.read_u32::<BE>().map_err(Self::truncated)? as usize;
        let cells = width * height;
        let mut symbols = Vec::with_capacity(cells);
        for _ in 0..cells {
            symbols.push(Symbol::from(reader.read_i8().map_err(Self::truncated)?));
        }
        let mut confidence = Vec::with_capacity(cells);
        for _ in 0..cells {
            confidence.push(reader.read_f32::<BE>().map_err(Self::truncated)?);
        }
        let mut age = Vec::with_capacity(cells);
        for _ in 0..cells {
            age.push(reader.read_u64::<BE>().map_err(Self::truncated)?);
        }
        let mut frontier = Vec::with_capacity(cells);
        for _ in 0..cells {
            frontier.push(reader.read_u8().map_err(Self::truncated)? != 0);
        }
        if reader.read_u16::<BE>().map_err(Self::truncated)? != FOOTER {
            return Err(SweepError::InvalidInput("missing snapshot footer".into()));
        }
        Ok(Self {
            tick,
            view: SolverView {
                symbols: Raster::from_vec(width, height, symbols),
                confidence: Raster::from_vec(width, height, confidence),
                age: Raster::from_vec(width, height, age),
                frontier: Raster::from_vec(width, height, frontier),
                origin: (ox, oy),
                last_update,
            },
        })
    }

    fn truncated(e: std::io::Error) -> SweepError {
        SweepError::InvalidInput(format!("truncated snapshot: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tensor::TensorGrid;

    #[test]
    fn encode_decode_round_trips() {
        let grid = TensorGrid::new();
        grid.set_cell((-3, 2), Symbol::Number(5), 0.75, true).unwrap();
        grid.set_cell((4, -1), Symbol::Flagged, 1.0, false).unwrap();
        let view = grid.solver_view();
        let snapshot = TickSnapshot {
            tick: 99,
            view: (*view).clone(),
        };
        let decoded = TickSnapshot::decode(&snapshot.encode()).unwrap();
        assert!(decoded.tick == 99);
        assert!(decoded.view.origin == view.origin);
        assert!(decoded.view.symbols == view.symbols);
        assert!(decoded.view.confidence == view.confidence);
        assert!(decoded.view.age == view.age);
        assert!(decoded.view.frontier == view.frontier);
    }

    #[test]
    fn replay_reproduces_the_solver_view() {
        let grid = TensorGrid::new();
        grid.set_cell((0, 0), Symbol::Number(1), 1.0, false).unwrap();
        grid.set_cell((1, 0), Symbol::Unknown, 0.0, true).unwrap();
        let view = grid.solver_view();
        let snapshot = TickSnapshot { tick: 1, view: (*view).clone() };
        let decoded = TickSnapshot::decode(&snapshot.encode()).unwrap();
        // replay into a fresh grid and compare what the solver sees
        let fresh = TensorGrid::new();
        for at in decoded.view.bounds().expect("nonempty").cells() {
            let (x, y) = decoded.view.local(at).expect("covered");
            fresh
                .set_cell(
                    at,
                    *decoded.view.symbols.get(x, y),
                    *decoded.view.confidence.get(x, y),
                    *decoded.view.frontier.get(x, y),
                )
                .unwrap();
        }
        let replayed = fresh.solver_view();
        assert!(replayed.symbols == view.symbols);
        assert!(replayed.frontier == view.frontier);
        assert!(replayed.origin == view.origin);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(TickSnapshot::decode(b"not a snapshot").is_err());
        let grid = TensorGrid::new();
        grid.set_cell((0, 0), Symbol::Empty, 1.0, false).unwrap();
        let snapshot = TickSnapshot {
            tick: 0,
            view: (*grid.solver_view()).clone(),
        };
        let mut bytes = snapshot.encode().to_vec();
        bytes.truncate(bytes.len() - 4);
        assert!(TickSnapshot::decode(&bytes).is_err());
    }
}
