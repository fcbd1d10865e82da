//! Block-relative pagination.
//!
//! Blocks declare how many in-scope transactions they hold, so the page
//! window can be located by walking headers alone. Only the blocks that
//! intersect the window are decoded.

use std::ops::Range;

use tracing::debug;

use crate::domain::{
    AppError, Block, BlockHeader, DecodeError, PayloadDecoder, TransactionScope, TransactionView,
};

/// Location of a page inside the concatenated transaction sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    /// Sum of declared transaction counts across all blocks in scope
    pub total: i64,
    /// First global index of the page (clamped to `total`)
    pub start_index: i64,
    /// One past the last global index of the page (clamped to `total`)
    pub end_index: i64,
    /// Positions of the needed blocks in the walked header sequence
    pub blocks: Range<usize>,
    /// Ids of the needed blocks, in walk order
    pub block_ids: Vec<i64>,
    /// Leading transactions of the first needed block outside the page
    pub start_trim: usize,
    /// Trailing transactions of the last needed block outside the page
    pub end_trim: usize,
}

impl PageWindow {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block_ids.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        (self.end_index - self.start_index) as usize
    }
}

/// Locate `[offset, offset + limit)` among `headers` in a single pass.
#[must_use]
pub fn plan_window(headers: &[BlockHeader], offset: i64, limit: i64) -> PageWindow {
    let offset = offset.max(0);
    let limit = limit.max(0);
    let wanted_end = offset.saturating_add(limit);

    let mut acc: i64 = 0;
    let mut first: Option<usize> = None;
    let mut last = 0usize;
    let mut last_block_end = 0i64;
    let mut start_trim = 0i64;
    let mut block_ids = Vec::new();

    for (position, header) in headers.iter().enumerate() {
        let block_start = acc;
        acc += header.tx.max(0);

        if limit == 0 || header.tx <= 0 {
            continue;
        }
        // [block_start, acc) intersects [offset, wanted_end)
        if block_start < wanted_end && acc > offset {
            if first.is_none() {
                first = Some(position);
                start_trim = offset - block_start;
            }
            last = position;
            last_block_end = acc;
            block_ids.push(header.id);
        }
    }

    let total = acc;
    let (blocks, start_trim, end_trim) = match first {
        Some(first) => (
            first..last + 1,
            start_trim as usize,
            (last_block_end - wanted_end).max(0) as usize,
        ),
        None => (0..0, 0, 0),
    };
    let start_index = offset.min(total);
    let end_index = wanted_end.min(total).max(start_index);

    PageWindow {
        total,
        start_index,
        end_index,
        blocks,
        block_ids,
        start_trim,
        end_trim,
    }
}

/// Decode the needed blocks of `window` and trim to the exact page.
///
/// `blocks` must yield the needed blocks in walk order. Every block must
/// decode to exactly its declared number of in-scope transactions.
pub fn materialize<'a, I>(
    window: &PageWindow,
    blocks: I,
    scope: &TransactionScope,
    decoder: &dyn PayloadDecoder,
) -> Result<Vec<TransactionView>, AppError>
where
    I: IntoIterator<Item = &'a Block>,
{
    if window.is_empty() {
        return Ok(Vec::new());
    }

    let blocks: Vec<&Block> = blocks.into_iter().collect();
    for (position, id) in window.block_ids.iter().enumerate() {
        if blocks.get(position).map(|b| b.id) != Some(*id) {
            return Err(DecodeError::MissingBlock(*id).into());
        }
    }

    let mut views = Vec::new();
    for block in &blocks {
        let decoded = decoder.decode(block.id, &block.payload)?;
        let before = views.len();
        views.extend(
            decoded
                .into_iter()
                .filter(|tx| scope.matches(tx))
                .map(|tx| TransactionView::from_raw(block.id, tx)),
        );
        let in_scope = views.len() - before;
        if in_scope as i64 != block.tx {
            return Err(DecodeError::CountMismatch {
                block_id: block.id,
                declared: block.tx,
                decoded: in_scope,
            }
            .into());
        }
    }

    let len = views.len();
    if len < window.start_trim + window.end_trim {
        return Err(DecodeError::Inconsistent {
            len,
            start_trim: window.start_trim,
            end_trim: window.end_trim,
        }
        .into());
    }

    debug!(
        decoded_blocks = blocks.len(),
        decoded_transactions = len,
        start_trim = window.start_trim,
        end_trim = window.end_trim,
        "Materialized page window"
    );

    views.truncate(len - window.end_trim);
    views.drain(..window.start_trim);
    Ok(views)
}

/// Paginate over blocks already loaded in memory, in the requested order.
///
/// Returns the page and the total transaction count of `blocks`.
pub fn paginate(
    blocks: &[Block],
    scope: &TransactionScope,
    offset: i64,
    limit: i64,
    decoder: &dyn PayloadDecoder,
) -> Result<(Vec<TransactionView>, i64), AppError> {
    let headers: Vec<BlockHeader> = blocks.iter().map(Block::header).collect();
    let window = plan_window(&headers, offset, limit);
    let needed = blocks[window.blocks.clone()].iter().filter(|b| b.tx > 0);
    let items = materialize(&window, needed, scope, decoder)?;
    Ok((items, window.total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawTransaction;
    use crate::test_utils::{CountingDecoder, block_with_counts};

    fn headers(counts: &[i64]) -> Vec<BlockHeader> {
        counts
            .iter()
            .enumerate()
            .map(|(i, tx)| BlockHeader {
                id: i as i64 + 1,
                tx: *tx,
                time: 0,
            })
            .collect()
    }

    #[test]
    fn test_window_trims_first_and_last_block() {
        let window = plan_window(&headers(&[3, 5, 2, 7]), 4, 3);
        assert_eq!(window.total, 17);
        assert_eq!(window.block_ids, vec![2]);
        assert_eq!(window.start_trim, 1);
        assert_eq!(window.end_trim, 1);

        let window = plan_window(&headers(&[3, 5, 2, 7]), 6, 3);
        assert_eq!(window.block_ids, vec![2, 3]);
        assert_eq!(window.blocks, 1..3);
        assert_eq!(window.start_trim, 3);
        assert_eq!(window.end_trim, 1);
    }

    #[test]
    fn test_offset_past_total_is_empty_with_total() {
        let window = plan_window(&headers(&[3, 5, 2, 7]), 17, 10);
        assert!(window.is_empty());
        assert_eq!(window.total, 17);
        assert_eq!(window.len(), 0);

        let window = plan_window(&headers(&[3, 5, 2, 7]), 40, 10);
        assert!(window.is_empty());
        assert_eq!(window.start_index, 17);
    }

    #[test]
    fn test_limit_beyond_history_clamps() {
        let window = plan_window(&headers(&[3, 5, 2, 7]), 10, 100);
        assert_eq!(window.block_ids, vec![4]);
        assert_eq!(window.start_trim, 0);
        assert_eq!(window.end_trim, 0);
        assert_eq!(window.end_index, 17);
        assert_eq!(window.len(), 7);
    }

    #[test]
    fn test_zero_limit_decodes_nothing() {
        let window = plan_window(&headers(&[3, 5]), 0, 0);
        assert!(window.is_empty());
        assert_eq!(window.total, 8);
    }

    #[test]
    fn test_empty_blocks_are_never_needed() {
        let window = plan_window(&headers(&[3, 0, 2]), 2, 2);
        assert_eq!(window.block_ids, vec![1, 3]);

        let blocks = block_with_counts(&[3, 0, 2], 1);
        let decoder = CountingDecoder::new();
        let (page, total) =
            paginate(&blocks, &TransactionScope::ecosystem(1), 2, 2, &decoder).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(decoder.decoded_blocks(), vec![1, 3]);
    }

    #[test]
    fn test_paginate_matches_full_sequence_for_every_window() {
        let counts = [3, 5, 2, 7];
        let blocks = block_with_counts(&counts, 1);
        let scope = TransactionScope::ecosystem(1);
        let decoder = CountingDecoder::new();
        let (everything, total) = paginate(&blocks, &scope, 0, 17, &decoder).unwrap();
        assert_eq!(total, 17);
        assert_eq!(everything.len(), 17);

        for offset in 0..=17i64 {
            for limit in 0..=20i64 {
                let (page, total) = paginate(&blocks, &scope, offset, limit, &decoder).unwrap();
                assert_eq!(total, 17);
                let end = (offset + limit).min(17) as usize;
                assert_eq!(
                    page,
                    everything[offset as usize..end].to_vec(),
                    "offset={} limit={}",
                    offset,
                    limit
                );
            }
        }
    }

    #[test]
    fn test_only_intersecting_blocks_are_decoded() {
        let blocks = block_with_counts(&[3, 5, 2, 7], 1);
        let decoder = CountingDecoder::new();
        let (page, _) = paginate(&blocks, &TransactionScope::ecosystem(1), 4, 3, &decoder).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(decoder.decoded_blocks(), vec![2]);

        let decoder = CountingDecoder::new();
        paginate(&blocks, &TransactionScope::ecosystem(1), 6, 3, &decoder).unwrap();
        assert_eq!(decoder.decoded_blocks(), vec![2, 3]);
    }

    #[test]
    fn test_declared_count_mismatch_is_hard_error() {
        let mut blocks = block_with_counts(&[3, 5], 1);
        blocks[1].tx = 6;
        let err = paginate(
            &blocks,
            &TransactionScope::ecosystem(1),
            3,
            6,
            &CountingDecoder::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::Decode(DecodeError::CountMismatch {
                block_id: 2,
                declared: 6,
                decoded: 5
            })
        ));
    }

    #[test]
    fn test_out_of_scope_transactions_are_filtered_before_counting() {
        let mut blocks = block_with_counts(&[2], 1);
        let mut decoded: Vec<RawTransaction> = bincode::deserialize(&blocks[0].payload).unwrap();
        let mut foreign = decoded[0].clone();
        foreign.hash = "foreign".to_string();
        foreign.ecosystem = 2;
        decoded.insert(1, foreign);
        blocks[0].payload = bincode::serialize(&decoded).unwrap();

        let (page, total) = paginate(
            &blocks,
            &TransactionScope::ecosystem(1),
            0,
            10,
            &CountingDecoder::new(),
        )
        .unwrap();
        assert_eq!(total, 2);
        assert!(page.iter().all(|tx| tx.ecosystem == 1));
    }

    #[test]
    fn test_missing_block_is_reported() {
        let blocks = block_with_counts(&[3, 5], 1);
        let window = plan_window(&[blocks[0].header(), blocks[1].header()], 2, 3);
        let err = materialize(
            &window,
            &blocks[..1],
            &TransactionScope::ecosystem(1),
            &CountingDecoder::new(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Decode(DecodeError::MissingBlock(2))));
    }
}
