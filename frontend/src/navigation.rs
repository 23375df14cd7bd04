/// Selection-index navigation shared by keyboard and controller input.
use log::trace;

use crate::controller::{Direction, PollBatch};
use crate::surface::Surfaces;

/// Moves `index` one cell in `direction` on a grid of `columns` columns holding
/// `count` items.
///
/// - No wraparound: Left on column 0, Right on the last column or last item,
///   Up on the first row and Down on the last row are no-ops.
/// - The last row may be short.  Down in a column that has no cell in the last
///   row lands on the last item instead of an empty cell.
pub fn navigate(index: usize, columns: usize, count: usize, direction: Direction) -> usize {
    if count == 0 {
        return 0;
    }
    let columns = columns.max(1);
    let last = count - 1;
    let index = index.min(last);
    let row = index / columns;
    let col = index % columns;
    let last_row = last / columns;

    match direction {
        Direction::Left if col > 0 => index - 1,
        Direction::Right if col + 1 < columns && index < last => index + 1,
        Direction::Up if row > 0 => index - columns,
        Direction::Down if row < last_row => {
            let last_row_len = count - last_row * columns;
            if col >= last_row_len {
                last
            } else {
                index + columns
            }
        }
        _ => index,
    }
}

/// Applies navigation commands to the selection index.
#[derive(Debug)]
pub struct NavigationDispatcher {
    selected: usize,
    columns: usize,
    count: usize,
    game_active: bool,
}

impl NavigationDispatcher {
    pub fn new(columns: usize, count: usize) -> Self {
        Self {
            selected: 0,
            columns: columns.max(1),
            count,
            game_active: false,
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn is_game_active(&self) -> bool {
        self.game_active
    }

    /// While a game is active every command is dropped.
    pub fn set_game_active(&mut self, active: bool) {
        self.game_active = active;
    }

    /// Updates the grid shape, clamping the selection into range.
    pub fn set_layout(&mut self, columns: usize, count: usize) {
        self.columns = columns.max(1);
        self.count = count;
        self.selected = self.selected.min(count.saturating_sub(1));
    }

    /// Moves the selection one cell.  Returns `true` if it changed.
    pub fn apply<S: Surfaces>(&mut self, direction: Direction, surfaces: &mut S) -> bool {
        if self.game_active {
            return false;
        }
        let old = self.selected;
        let new = navigate(old, self.columns, self.count, direction);
        if new == old {
            return false;
        }
        trace!("Selection {old} -> {new} ({direction:?})");
        self.selected = new;
        surfaces.invalidate_cell(old);
        surfaces.invalidate_cell(new);
        surfaces.scroll_into_view(new);
        true
    }

    /// Applies one poll's controller commands.  A command whose axis has both
    /// directions active on the same controller is dropped; the other axis is
    /// unaffected.  Returns the number of commands that moved the selection.
    pub fn dispatch_batch<S: Surfaces>(&mut self, batch: &PollBatch, surfaces: &mut S) -> usize {
        let mut moved = 0;
        for cmd in &batch.commands {
            if batch.active[cmd.controller].conflicts(cmd.direction) {
                continue;
            }
            if self.apply(cmd.direction, surfaces) {
                moved += 1;
            }
        }
        moved
    }
}
