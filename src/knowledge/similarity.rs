//! Text similarity used to match user questions against FAQ entries.
//!
//! The character score is a Ratcliff/Obershelp ratio that reproduces
//! difflib's `SequenceMatcher` exactly, including its "popular element"
//! heuristic for long second sequences, so scores stay comparable with
//! thresholds tuned against it.

use std::collections::{HashMap, HashSet};

const STOP_WORDS: &[&str] = &[
    "что", "как", "где", "когда", "кто", "какой", "какая", "какие", "нужно", "можно", "ли", "в",
    "на", "по", "с", "и", "или", "а", "но", "это", "то", "да", "нет", "для", "при", "о", "об",
    "от", "до", "из", "у", "к",
];

/// Combined score in `0.0..=1.0`: `0.6 * ratio + 0.4 * keyword_jaccard`,
/// or the plain ratio when either side has no keywords left.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let r = ratio(&a_chars, &b_chars);

    let wa = keywords(&a);
    let wb = keywords(&b);
    if wa.is_empty() || wb.is_empty() {
        return r;
    }
    let inter = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    let j = if union > 0 { inter as f64 / union as f64 } else { 0.0 };
    r * 0.6 + j * 0.4
}

fn keywords(text: &str) -> HashSet<&str> {
    text.split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .collect()
}

/// `2 * matches / (len(a) + len(b))`, 1.0 for two empty inputs.
pub fn ratio<T: Eq + std::hash::Hash + Copy>(a: &[T], b: &[T]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched: usize = Matcher::new(a, b).matching_blocks().iter().map(|m| m.2).sum();
    2.0 * matched as f64 / total as f64
}

struct Matcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<T, Vec<usize>>,
}

impl<'a, T: Eq + std::hash::Hash + Copy> Matcher<'a, T> {
    fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<T, Vec<usize>> = HashMap::new();
        for (j, item) in b.iter().enumerate() {
            b2j.entry(*item).or_default().push(j);
        }
        let n = b.len();
        if n >= 200 {
            let ntest = n / 100 + 1;
            b2j.retain(|_, idxs| idxs.len() <= ntest);
        }
        Self { a, b, b2j }
    }

    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let (a, b) = (self.a, self.b);
        let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0usize);
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(idxs) = self.b2j.get(&a[i]) {
                for &j in idxs {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0) + 1;
                    next.insert(j, k);
                    if k > bestsize {
                        besti = i + 1 - k;
                        bestj = j + 1 - k;
                        bestsize = k;
                    }
                }
            }
            j2len = next;
        }

        // Popular elements were dropped from the index but still extend a match.
        while besti > alo && bestj > blo && a[besti - 1] == b[bestj - 1] {
            besti -= 1;
            bestj -= 1;
            bestsize += 1;
        }
        while besti + bestsize < ahi && bestj + bestsize < bhi && a[besti + bestsize] == b[bestj + bestsize] {
            bestsize += 1;
        }
        (besti, bestj, bestsize)
    }

    fn matching_blocks(&self) -> Vec<(usize, usize, usize)> {
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        let mut blocks = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.find_longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            blocks.push((i, j, k));
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }
        blocks.sort_unstable();
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn ratio_matches_difflib() {
        assert_eq!(ratio(&chars("abcd"), &chars("bcde")), 0.75);
        assert_eq!(ratio(&chars(""), &chars("")), 1.0);
        assert_eq!(ratio(&chars("abc"), &chars("")), 0.0);
        assert_eq!(ratio(&chars("инструктаж"), &chars("инструктаж")), 1.0);
    }

    #[test]
    fn ratio_recurses_on_both_sides() {
        // "a" + "cd" + "f" blocks: 4 matched of 6 + 6.
        let r = ratio(&chars("abcdef"), &chars("axcdyf"));
        assert!((r - 8.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn popular_elements_only_extend_matches() {
        // Reference values from difflib.SequenceMatcher(None, a, b).ratio().
        let long = "a".repeat(200);
        assert_eq!(ratio(&chars(&long), &chars(&long)), 1.0);

        let a = format!("{}xyz{}", "ab ".repeat(80), "q".repeat(5));
        let b = format!("{}xyz", "ab ".repeat(90));
        assert!((ratio(&chars(&a), &chars(&b)) - 0.9328214971209213).abs() < 1e-12);

        // 'a' is popular in b, so only "xyz" seeds a match; it then extends
        // over five trailing 'a's. Without the heuristic the score is 0.0926.
        let a = format!("xyz{}", "a".repeat(10));
        let b = format!("{}xyz{}", "a".repeat(195), "a".repeat(5));
        assert!((ratio(&chars(&a), &chars(&b)) - 16.0 / 216.0).abs() < 1e-12);
    }

    #[test]
    fn identical_questions_score_one() {
        let q = "Как провести вводный инструктаж?";
        assert!((similarity(q, &q.to_uppercase()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn stop_words_only_falls_back_to_ratio() {
        let s = similarity("как и что", "где и когда");
        let r = ratio(&chars("как и что"), &chars("где и когда"));
        assert!((s - r).abs() < 1e-9);
    }

    #[test]
    fn keyword_overlap_raises_score() {
        let close = similarity("периодичность инструктажа по охране труда", "инструктажа по охране труда периодичность");
        let far = similarity("периодичность инструктажа по охране труда", "нормы освещенности спальни");
        assert!(close > far);
        assert!(close > 0.5);
        assert!(far < 0.5);
    }
}
