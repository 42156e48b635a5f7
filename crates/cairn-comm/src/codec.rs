//! Pack/unpack of block array sub-ranges into flat transfer buffers.
//!
//! All four routines walk the hyper-rectangle in a fixed nested order —
//! variable, then `x3`, then `x2`, then `x1` — and advance the caller's
//! running offset by exactly the number of elements moved, so repeated
//! calls on disjoint buffer regions compose losslessly. The inner `x1`
//! loop is a contiguous slice copy with no cross-iteration dependency;
//! packing throughput dominates exchange latency at scale, so keep it
//! that way.
//!
//! Range arguments are caller-validated preconditions. Out-of-range
//! indices panic on the underlying slice accesses.

use cairn_mesh::{CellRange, VarArray4};

/// Pack a variable range plus three spatial ranges of `src` into `buf`
/// starting at `*offset`; advances the offset.
pub fn pack_vars(
    src: &VarArray4,
    buf: &mut [f64],
    vr: CellRange,
    kr: CellRange,
    jr: CellRange,
    ir: CellRange,
    offset: &mut usize,
) {
    let width = ir.len();
    for n in vr.lo..=vr.hi {
        for k in kr.lo..=kr.hi {
            for j in jr.lo..=jr.hi {
                let row = &src.row(n, k, j)[ir.lo..=ir.hi];
                buf[*offset..*offset + width].copy_from_slice(row);
                *offset += width;
            }
        }
    }
}

/// Pack three spatial ranges of a single-variable array (variable 0)
/// into `buf` starting at `*offset`; advances the offset.
///
/// Produces the same bytes as [`pack_vars`] with a `0..=0` variable
/// range.
pub fn pack(
    src: &VarArray4,
    buf: &mut [f64],
    kr: CellRange,
    jr: CellRange,
    ir: CellRange,
    offset: &mut usize,
) {
    pack_vars(src, buf, CellRange::new(0, 0), kr, jr, ir, offset);
}

/// Unpack `buf` starting at `*offset` into a variable range plus three
/// spatial ranges of `dst`; advances the offset.
pub fn unpack_vars(
    buf: &[f64],
    dst: &mut VarArray4,
    vr: CellRange,
    kr: CellRange,
    jr: CellRange,
    ir: CellRange,
    offset: &mut usize,
) {
    let width = ir.len();
    for n in vr.lo..=vr.hi {
        for k in kr.lo..=kr.hi {
            for j in jr.lo..=jr.hi {
                let row = &mut dst.row_mut(n, k, j)[ir.lo..=ir.hi];
                row.copy_from_slice(&buf[*offset..*offset + width]);
                *offset += width;
            }
        }
    }
}

/// Unpack `buf` starting at `*offset` into three spatial ranges of a
/// single-variable array (variable 0); advances the offset.
pub fn unpack(
    buf: &[f64],
    dst: &mut VarArray4,
    kr: CellRange,
    jr: CellRange,
    ir: CellRange,
    offset: &mut usize,
) {
    unpack_vars(buf, dst, CellRange::new(0, 0), kr, jr, ir, offset);
}

/// Elements covered by a variable range plus three spatial ranges.
pub fn range_len(vr: CellRange, kr: CellRange, jr: CellRange, ir: CellRange) -> usize {
    vr.len() * kr.len() * jr.len() * ir.len()
}
