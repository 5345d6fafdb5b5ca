//! Recurrent building blocks: cells and the caller-owned hidden state.

pub mod recurrent;
pub mod state;

pub use recurrent::{
    GruCell, GruCellConfig, HiddenState, LstmCellConfig, LstmCellWrapper, MemoryCell, RecurrentCell,
    RecurrentCellType,
};
pub use state::{HiddenStates, RecurrentState};
