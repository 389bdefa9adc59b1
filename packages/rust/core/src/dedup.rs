//! Duplicate collapse across sources.
//!
//! Two passes: exact collapse by content hash, then near-duplicate
//! collapse by token-set Jaccard similarity, iterated to a fixed point.
//! Survivor selection is fully deterministic: source priority, then
//! shortest path, then lexicographic order.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, instrument};

use docsync_shared::{RenderedPage, content_hash, count_tokens, normalize_for_hash};

/// Optional collaborator that can fold a near-duplicate pair into one
/// merged body. The dedup pass behaves identically when absent.
pub trait ContentSynthesizer: Send + Sync {
    /// `(shorter, longer, title) → merged body | None`.
    fn synthesize(&self, shorter: &str, longer: &str, title: &str) -> Option<String>;
}

/// Collapse duplicates. Returns survivors in their original order.
#[instrument(skip_all, fields(input = pages.len()))]
pub fn deduplicate(
    pages: Vec<RenderedPage>,
    similarity_threshold: f64,
    synthesizer: Option<&dyn ContentSynthesizer>,
) -> Vec<RenderedPage> {
    let before = pages.len();
    let pages = exact_pass(pages);
    let after_exact = pages.len();
    let pages = near_duplicate_pass(pages, similarity_threshold, synthesizer);

    info!(
        input = before,
        exact_survivors = after_exact,
        survivors = pages.len(),
        "dedup complete"
    );
    pages
}

// ---------------------------------------------------------------------------
// Exact pass
// ---------------------------------------------------------------------------

/// Group by content hash; keep exactly one survivor per group.
fn exact_pass(pages: Vec<RenderedPage>) -> Vec<RenderedPage> {
    let mut winner_by_hash: HashMap<String, usize> = HashMap::new();

    for (i, page) in pages.iter().enumerate() {
        match winner_by_hash.get(&page.content_hash) {
            None => {
                winner_by_hash.insert(page.content_hash.clone(), i);
            }
            Some(&current) => {
                if beats(page, &pages[current]) {
                    debug!(
                        dropped = %pages[current].path,
                        kept = %page.path,
                        "exact duplicate collapsed"
                    );
                    winner_by_hash.insert(page.content_hash.clone(), i);
                } else {
                    debug!(dropped = %page.path, kept = %pages[current].path, "exact duplicate collapsed");
                }
            }
        }
    }

    let keep: HashSet<usize> = winner_by_hash.into_values().collect();
    pages
        .into_iter()
        .enumerate()
        .filter_map(|(i, page)| keep.contains(&i).then_some(page))
        .collect()
}

/// Survivor selection: higher source priority wins; ties go to the
/// shorter path, then the lexicographically first path.
fn beats(challenger: &RenderedPage, incumbent: &RenderedPage) -> bool {
    let by_priority = challenger
        .source
        .priority()
        .cmp(&incumbent.source.priority());
    let by_path_len = incumbent.path.len().cmp(&challenger.path.len());
    let by_path = incumbent.path.cmp(&challenger.path);

    by_priority
        .then(by_path_len)
        .then(by_path)
        .is_gt()
}

// ---------------------------------------------------------------------------
// Near-duplicate pass
// ---------------------------------------------------------------------------

/// Jaccard similarity over whitespace-split tokens of normalized text.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

fn token_set(markdown: &str) -> HashSet<String> {
    normalize_for_hash(markdown)
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// Drop the shorter page of every pair at or above the threshold, until no
/// such pair remains. O(n²) per round; the page set is small.
fn near_duplicate_pass(
    mut pages: Vec<RenderedPage>,
    threshold: f64,
    synthesizer: Option<&dyn ContentSynthesizer>,
) -> Vec<RenderedPage> {
    loop {
        let tokens: Vec<HashSet<String>> = pages.iter().map(|p| token_set(&p.markdown)).collect();

        let mut drop_index: Option<(usize, usize)> = None;
        'scan: for i in 0..pages.len() {
            for j in (i + 1)..pages.len() {
                if tokens[i].is_empty() || tokens[j].is_empty() {
                    continue;
                }
                if jaccard(&tokens[i], &tokens[j]) >= threshold {
                    let (shorter, longer) = shorter_of(&pages, i, j);
                    drop_index = Some((shorter, longer));
                    break 'scan;
                }
            }
        }

        let Some((shorter, longer)) = drop_index else {
            return pages;
        };

        // The collaborator may fold both bodies into the survivor before
        // the shorter page is dropped.
        if let Some(synthesizer) = synthesizer {
            let merged = synthesizer.synthesize(
                &pages[shorter].markdown,
                &pages[longer].markdown,
                &pages[longer].title,
            );
            if let Some(markdown) = merged {
                let survivor = &mut pages[longer];
                survivor.content_hash = content_hash(&markdown);
                survivor.token_count = count_tokens(&markdown);
                survivor.markdown = markdown;
            }
        }

        debug!(
            dropped = %pages[shorter].path,
            kept = %pages[longer].path,
            "near duplicate collapsed"
        );
        pages.remove(shorter);
    }
}

/// Index of the page to drop (shorter markdown; ties drop the
/// lexicographically later path) and of the survivor.
fn shorter_of(pages: &[RenderedPage], i: usize, j: usize) -> (usize, usize) {
    let (a, b) = (&pages[i], &pages[j]);
    match a.markdown.len().cmp(&b.markdown.len()) {
        std::cmp::Ordering::Less => (i, j),
        std::cmp::Ordering::Greater => (j, i),
        std::cmp::Ordering::Equal => {
            if a.path > b.path {
                (i, j)
            } else {
                (j, i)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
