//! Property tests for the display matrix and the diff engine.

use core_render::matrix::{ATTR_NORMAL, COLOR_DEFAULT, DisplayMatrix, Rect};
use core_render::{Screen, ScreenDiff};
use core_terminal::{Capabilities, MemorySurface, TerminalSurface};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum MatrixOp {
    Set { row: u16, col: u16, ch: char },
    Region(Rect),
    Cursor { row: u16, col: u16 },
    ScrollUp { start: u16, end: u16, n: u16 },
    Clear,
}

fn op_strategy() -> impl Strategy<Value = MatrixOp> {
    prop_oneof![
        (0..24u16, 0..80u16, proptest::char::range('a', 'z'))
            .prop_map(|(row, col, ch)| MatrixOp::Set { row, col, ch }),
        (0..20u16, 0..70u16, 0..4u16, 0..10u16).prop_map(|(top, left, dr, dc)| {
            MatrixOp::Region(Rect {
                top,
                left,
                bottom: top + dr,
                right: left + dc,
            })
        }),
        (0..24u16, 0..80u16).prop_map(|(row, col)| MatrixOp::Cursor { row, col }),
        (0..10u16, 12..23u16, 1..3u16).prop_map(|(start, end, n)| MatrixOp::ScrollUp {
            start,
            end,
            n
        }),
        Just(MatrixOp::Clear),
    ]
}

proptest! {
    #[test]
    fn commit_always_clears_dirty_state(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut m = DisplayMatrix::new(24, 80).unwrap();
        for op in ops {
            match op {
                MatrixOp::Set { row, col, ch } => {
                    m.set_cell(row, col, ch, ATTR_NORMAL, COLOR_DEFAULT, COLOR_DEFAULT)
                }
                MatrixOp::Region(rect) => m.mark_region_dirty(rect),
                MatrixOp::Cursor { row, col } => m.set_cursor(row, col),
                MatrixOp::ScrollUp { start, end, n } => m.scroll_up(start, end, n),
                MatrixOp::Clear => m.clear_all(),
            }
        }
        m.commit_updates();
        prop_assert_eq!(m.dirty_span(), None);
        for row in 0..m.rows() {
            prop_assert!(!m.is_line_dirty(row));
            for col in 0..m.cols() {
                prop_assert!(!m.is_cell_dirty(row, col));
            }
        }
    }

    #[test]
    fn flush_converges_physical_to_virtual(
        rows in prop::collection::vec(prop::collection::vec(0x20u32..0x7F, 40), 10)
    ) {
        let mut diff = ScreenDiff::new(10, 40, Capabilities::default());
        let mut surface = MemorySurface::new(10, 40);
        for (i, cells) in rows.iter().enumerate() {
            diff.virt.set_line(i, cells);
        }
        diff.flush_to(&mut surface, false).unwrap();
        surface.flush().unwrap();
        for i in 0..10 {
            prop_assert_eq!(&diff.phys.lines[i].cells, &diff.virt.lines[i].cells, "row {}", i);
            let shown: String = surface.row_text(i as u16);
            let want: String = diff.virt.lines[i].cells.iter()
                .map(|&c| char::from_u32(c).unwrap_or(' '))
                .collect();
            prop_assert_eq!(shown, want);
        }
        // A second flush with re-flagged lines writes nothing.
        let before = surface.put_count();
        for line in diff.virt.lines.iter_mut() {
            line.changed = true;
        }
        diff.flush_to(&mut surface, false).unwrap();
        prop_assert_eq!(surface.put_count(), before);
    }
}

#[test]
fn screen_resize_resets_dimensions() {
    let mut s = Screen::new(5, 10);
    s.set_line(2, &['x' as u32; 10]);
    s.resize(8, 20);
    assert_eq!(s.rows(), 8);
    assert_eq!(s.cols, 20);
    assert!(s.lines.iter().all(|l| l.cells.len() == 20));
}
