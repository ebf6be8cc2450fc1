//! K-way merge over sorted run files.
//!
//! Children are framed readers over individually sorted runs. A binary
//! min-heap of child indexes orders the streams by the comparator; equal
//! records are tie-broken by child index, so records from earlier runs win
//! and each merged record's tag reports the run it came from. An optional
//! reducer collapses each maximal group of equal records into one.

use std::cmp::Ordering;
use std::io;

use crate::record::{CompareFn, RecordView, ReduceFn};

use super::FramedReader;

pub(crate) struct MergedInput {
    children: Vec<FramedReader>,
    heap: Vec<usize>,
    compare: CompareFn,
    reduce: Option<ReduceFn>,
    out: Vec<u8>,
    out_tag: i32,
    group: Vec<(Vec<u8>, i32)>,
    started: bool,
}

fn heap_less(children: &[FramedReader], compare: &CompareFn, a: usize, b: usize) -> bool {
    let ra = children[a].current();
    let rb = children[b].current();
    match compare(&ra, &rb) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => a < b,
    }
}

fn sift_down(heap: &mut [usize], children: &[FramedReader], compare: &CompareFn, mut pos: usize) {
    loop {
        let left = 2 * pos + 1;
        if left >= heap.len() {
            break;
        }
        let right = left + 1;
        let mut min = left;
        if right < heap.len() && heap_less(children, compare, heap[right], heap[left]) {
            min = right;
        }
        if heap_less(children, compare, heap[min], heap[pos]) {
            heap.swap(min, pos);
            pos = min;
        } else {
            break;
        }
    }
}

/// Advances the root child past its current record, restoring heap order
/// (or shrinking the heap when the child is exhausted).
fn advance_root(
    heap: &mut Vec<usize>,
    children: &mut [FramedReader],
    compare: &CompareFn,
) -> io::Result<()> {
    let root = heap[0];
    if children[root].advance()? {
        sift_down(heap, children, compare, 0);
    } else {
        let last = heap.pop().expect("advance_root on empty heap");
        if !heap.is_empty() {
            heap[0] = last;
            sift_down(heap, children, compare, 0);
        }
    }
    Ok(())
}

impl MergedInput {
    pub(crate) fn new(
        mut children: Vec<FramedReader>,
        compare: CompareFn,
        reduce: Option<ReduceFn>,
    ) -> MergedInput {
        for (i, child) in children.iter_mut().enumerate() {
            child.set_tag(i as i32);
        }
        MergedInput {
            children,
            heap: Vec::new(),
            compare,
            reduce,
            out: Vec::new(),
            out_tag: 0,
            group: Vec::new(),
            started: false,
        }
    }

    pub(crate) fn next(&mut self) -> io::Result<Option<RecordView<'_>>> {
        if !self.started {
            self.started = true;
            for i in 0..self.children.len() {
                if self.children[i].advance()? {
                    self.heap.push(i);
                }
            }
            let MergedInput {
                children,
                heap,
                compare,
                ..
            } = &mut *self;
            for k in (0..heap.len() / 2).rev() {
                sift_down(heap, children, &*compare, k);
            }
        }
        if self.heap.is_empty() {
            return Ok(None);
        }

        let MergedInput {
            children,
            heap,
            compare,
            reduce,
            out,
            out_tag,
            group,
            ..
        } = &mut *self;

        let root = heap[0];
        out.clear();
        out.extend_from_slice(children[root].current().bytes);
        *out_tag = root as i32;
        advance_root(heap, children, &*compare)?;

        if let Some(red) = reduce {
            group.clear();
            while let Some(&i) = heap.first() {
                let cand = children[i].current();
                let head = RecordView {
                    bytes: out,
                    tag: *out_tag,
                };
                if compare(&cand, &head) != Ordering::Equal {
                    break;
                }
                group.push((cand.bytes.to_vec(), i as i32));
                advance_root(heap, children, &*compare)?;
            }
            if !group.is_empty() {
                let mut views = Vec::with_capacity(group.len() + 1);
                views.push(RecordView {
                    bytes: out,
                    tag: *out_tag,
                });
                for (bytes, tag) in group.iter() {
                    views.push(RecordView { bytes, tag: *tag });
                }
                let reduced = red(&views);
                drop(views);
                *out = reduced;
            }
        }

        Ok(Some(RecordView {
            bytes: out,
            tag: *out_tag,
        }))
    }
}
