//! Built-in movement modes.

use itinera_core::{Point, Position, Result};

use crate::block::{Block, BlockProvider};
use crate::mode::{Mode, ModeType, MoveOption};

/// Push every candidate whose block passes `keep(source, target)`.
fn push_where(
    from: Position,
    candidates: &[Point],
    blocks: &dyn BlockProvider,
    out: &mut Vec<MoveOption>,
    cost: f64,
    mode: ModeType,
    keep: impl Fn(Block, Block) -> bool,
) -> Result<()> {
    let here = blocks.query(from)?;
    for &p in candidates {
        let to = from.with_point(p);
        if keep(here, blocks.query(to)?) {
            out.push(MoveOption { to, cost, mode });
        }
    }
    Ok(())
}

/// Planar four-neighbour movement through open cells.
#[derive(Clone, Debug)]
pub struct Walk {
    pub cost: f64,
}

impl Default for Walk {
    fn default() -> Self {
        Self { cost: 1.0 }
    }
}

impl Mode for Walk {
    fn mode_type(&self) -> ModeType {
        ModeType::Walk
    }

    fn options(
        &self,
        from: Position,
        blocks: &dyn BlockProvider,
        out: &mut Vec<MoveOption>,
    ) -> Result<()> {
        let around = from.point.neighbors_4();
        push_where(from, &around, blocks, out, self.cost, ModeType::Walk, |_, to| {
            to.is_open()
        })
    }
}

/// Movement into water, in any of the six face directions.
#[derive(Clone, Debug)]
pub struct Swim {
    pub cost: f64,
}

impl Default for Swim {
    fn default() -> Self {
        Self { cost: 2.0 }
    }
}

impl Mode for Swim {
    fn mode_type(&self) -> ModeType {
        ModeType::Swim
    }

    fn options(
        &self,
        from: Position,
        blocks: &dyn BlockProvider,
        out: &mut Vec<MoveOption>,
    ) -> Result<()> {
        let around = from.point.neighbors_6();
        push_where(from, &around, blocks, out, self.cost, ModeType::Swim, |_, to| {
            to.is_water()
        })
    }
}

/// Vertical movement along ladders: up or down into an open cell when either
/// end is climbable.
#[derive(Clone, Debug)]
pub struct Climb {
    pub cost: f64,
}

impl Default for Climb {
    fn default() -> Self {
        Self { cost: 1.5 }
    }
}

impl Mode for Climb {
    fn mode_type(&self) -> ModeType {
        ModeType::Climb
    }

    fn options(
        &self,
        from: Position,
        blocks: &dyn BlockProvider,
        out: &mut Vec<MoveOption>,
    ) -> Result<()> {
        let around = [from.point.shift(0, 0, 1), from.point.shift(0, 0, -1)];
        push_where(
            from,
            &around,
            blocks,
            out,
            self.cost,
            ModeType::Climb,
            |here, to| to.is_open() && (here.is_climbable() || to.is_climbable()),
        )
    }
}

/// Free six-neighbour movement through open cells.
#[derive(Clone, Debug)]
pub struct Fly {
    pub cost: f64,
}

impl Default for Fly {
    fn default() -> Self {
        Self { cost: 1.0 }
    }
}

impl Mode for Fly {
    fn mode_type(&self) -> ModeType {
        ModeType::Fly
    }

    fn options(
        &self,
        from: Position,
        blocks: &dyn BlockProvider,
        out: &mut Vec<MoveOption>,
    ) -> Result<()> {
        let around = from.point.neighbors_6();
        push_where(from, &around, blocks, out, self.cost, ModeType::Fly, |_, to| {
            to.is_open()
        })
    }
}

/// Tunnelling into solid cells, in any of the six face directions.
#[derive(Clone, Debug)]
pub struct Dig {
    pub cost: f64,
}

impl Default for Dig {
    fn default() -> Self {
        Self { cost: 5.0 }
    }
}

impl Mode for Dig {
    fn mode_type(&self) -> ModeType {
        ModeType::Dig
    }

    fn options(
        &self,
        from: Position,
        blocks: &dyn BlockProvider,
        out: &mut Vec<MoveOption>,
    ) -> Result<()> {
        let around = from.point.neighbors_6();
        push_where(from, &around, blocks, out, self.cost, ModeType::Dig, |_, to| {
            to.is_solid()
        })
    }
}
