// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Probabilistic skip list ordered by `(score, member bytes)`.
//!
//! Nodes live in an index arena with a free list, so links are plain
//! `usize` indices instead of pointers. Every forward link carries a span
//! (nodes crossed when following it), which makes rank queries O(log n).
//! Level 0 is a full ordered list; a sentinel head node occupies slot 0.

use bytes::Bytes;
use rand::RngExt;

pub const MAX_LEVEL: usize = 32;

const HEAD: usize = 0;

#[derive(Debug, Clone, Copy, Default)]
struct Link {
    next: Option<usize>,
    span: usize,
}

#[derive(Debug, Clone)]
struct Node {
    member: Bytes,
    score: f64,
    links: Vec<Link>,
    backward: Option<usize>,
}

/// Score-range bound; `exclusive` mirrors the `(` prefix of ZRANGEBYSCORE.
#[derive(Debug, Clone, Copy)]
pub struct ScoreBound {
    pub value: f64,
    pub exclusive: bool,
}

impl ScoreBound {
    pub fn inclusive(value: f64) -> Self {
        Self { value, exclusive: false }
    }

    fn admits_from_below(&self, score: f64) -> bool {
        if self.exclusive { score > self.value } else { score >= self.value }
    }

    fn admits_from_above(&self, score: f64) -> bool {
        if self.exclusive { score < self.value } else { score <= self.value }
    }
}

#[derive(Debug, Clone)]
pub struct SkipList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    level: usize,
    len: usize,
    tail: Option<usize>,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    pub fn new() -> Self {
        let head = Node {
            member: Bytes::new(),
            score: f64::NEG_INFINITY,
            links: vec![Link::default(); MAX_LEVEL],
            backward: None,
        };
        Self {
            nodes: vec![head],
            free: Vec::new(),
            level: 1,
            len: 0,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn random_level() -> usize {
        let mut level = 1;
        let mut rng = rand::rng();
        while level < MAX_LEVEL && rng.random_range(0..4) == 0 {
            level += 1;
        }
        level
    }

    /// Strict ordering on `(score, member)`.
    fn precedes(&self, idx: usize, score: f64, member: &[u8]) -> bool {
        let node = &self.nodes[idx];
        node.score < score
            || (node.score == score && node.member.as_ref() < member)
    }

    fn alloc(&mut self, member: Bytes, score: f64, level: usize) -> usize {
        let node = Node {
            member,
            score,
            links: vec![Link::default(); level],
            backward: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            },
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            },
        }
    }

    /// Inserts a member the caller has verified is absent.
    pub fn insert(&mut self, member: Bytes, score: f64) {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            while let Some(nxt) = self.nodes[x].links[i].next {
                if self.precedes(nxt, score, &member) {
                    rank[i] += self.nodes[x].links[i].span;
                    x = nxt;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let level = Self::random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEAD;
                self.nodes[HEAD].links[i].span = self.len;
            }
            self.level = level;
        }

        let new = self.alloc(member, score, level);
        for i in 0..level {
            let prev = update[i];
            self.nodes[new].links[i].next = self.nodes[prev].links[i].next;
            self.nodes[new].links[i].span =
                self.nodes[prev].links[i].span - (rank[0] - rank[i]);
            self.nodes[prev].links[i].next = Some(new);
            self.nodes[prev].links[i].span = rank[0] - rank[i] + 1;
        }
        for i in level..self.level {
            self.nodes[update[i]].links[i].span += 1;
        }

        self.nodes[new].backward =
            if update[0] == HEAD { None } else { Some(update[0]) };
        match self.nodes[new].links[0].next {
            Some(nxt) => self.nodes[nxt].backward = Some(new),
            None => self.tail = Some(new),
        }
        self.len += 1;
    }

    pub fn delete(&mut self, member: &[u8], score: f64) -> bool {
        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(nxt) = self.nodes[x].links[i].next {
                if self.precedes(nxt, score, member) {
                    x = nxt;
                } else {
                    break;
                }
            }
            update[i] = x;
        }
        let Some(target) = self.nodes[x].links[0].next else {
            return false;
        };
        if self.nodes[target].score != score
            || self.nodes[target].member.as_ref() != member
        {
            return false;
        }

        for i in 0..self.level {
            let prev = update[i];
            if self.nodes[prev].links[i].next == Some(target) {
                let tspan = self.nodes[target].links.get(i).map_or(0, |l| l.span);
                let tnext = self.nodes[target].links.get(i).and_then(|l| l.next);
                self.nodes[prev].links[i].span += tspan;
                self.nodes[prev].links[i].span -= 1;
                self.nodes[prev].links[i].next = tnext;
            } else {
                self.nodes[prev].links[i].span -= 1;
            }
        }

        match self.nodes[target].links[0].next {
            Some(nxt) => self.nodes[nxt].backward = self.nodes[target].backward,
            None => {
                self.tail = self.nodes[target].backward;
            },
        }

        while self.level > 1
            && self.nodes[HEAD].links[self.level - 1].next.is_none()
        {
            self.level -= 1;
        }

        self.nodes[target].links.clear();
        self.nodes[target].member = Bytes::new();
        self.free.push(target);
        self.len -= 1;
        true
    }

    /// 0-based rank of a member whose score the caller already knows.
    pub fn rank(&self, member: &[u8], score: f64) -> Option<usize> {
        let mut traversed = 0usize;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(nxt) = self.nodes[x].links[i].next {
                let node = &self.nodes[nxt];
                let le = node.score < score
                    || (node.score == score && node.member.as_ref() <= member);
                if le {
                    traversed += self.nodes[x].links[i].span;
                    x = nxt;
                } else {
                    break;
                }
            }
            if x != HEAD
                && self.nodes[x].member.as_ref() == member
                && self.nodes[x].score == score
            {
                return Some(traversed - 1);
            }
        }
        None
    }

    /// Node at 0-based rank.
    fn node_at_rank(&self, rank: usize) -> Option<usize> {
        if rank >= self.len {
            return None;
        }
        let target = rank + 1;
        let mut traversed = 0usize;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(nxt) = self.nodes[x].links[i].next {
                if traversed + self.nodes[x].links[i].span <= target {
                    traversed += self.nodes[x].links[i].span;
                    x = nxt;
                } else {
                    break;
                }
            }
            if traversed == target {
                return Some(x);
            }
        }
        None
    }

    pub fn by_rank(&self, rank: usize) -> Option<(Bytes, f64)> {
        let idx = self.node_at_rank(rank)?;
        let node = &self.nodes[idx];
        Some((node.member.clone(), node.score))
    }

    /// Inclusive rank-range scan; bounds pre-resolved to `0..len`.
    pub fn range_by_rank(
        &self,
        start: usize,
        stop: usize,
        reverse: bool,
    ) -> Vec<(Bytes, f64)> {
        if start > stop || start >= self.len {
            return Vec::new();
        }
        let stop = stop.min(self.len - 1);
        let mut out = Vec::with_capacity(stop - start + 1);
        let Some(mut idx) = self.node_at_rank(start) else {
            return out;
        };
        for _ in start..=stop {
            let node = &self.nodes[idx];
            out.push((node.member.clone(), node.score));
            match node.links[0].next {
                Some(nxt) => idx = nxt,
                None => break,
            }
        }
        if reverse {
            out.reverse();
        }
        out
    }

    /// First node admitted by `min`.
    fn first_in_score_range(&self, min: ScoreBound) -> Option<usize> {
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(nxt) = self.nodes[x].links[i].next {
                if !min.admits_from_below(self.nodes[nxt].score) {
                    x = nxt;
                } else {
                    break;
                }
            }
        }
        self.nodes[x].links[0].next
    }

    pub fn range_by_score(
        &self,
        min: ScoreBound,
        max: ScoreBound,
        offset: usize,
        count: usize,
    ) -> Vec<(Bytes, f64)> {
        let mut out = Vec::new();
        let mut cur = self.first_in_score_range(min);
        let mut skipped = 0usize;
        while let Some(idx) = cur {
            let node = &self.nodes[idx];
            if !max.admits_from_above(node.score) {
                break;
            }
            if skipped < offset {
                skipped += 1;
            } else {
                out.push((node.member.clone(), node.score));
                if out.len() >= count {
                    break;
                }
            }
            cur = node.links[0].next;
        }
        out
    }

    pub fn count_by_score(&self, min: ScoreBound, max: ScoreBound) -> usize {
        let mut n = 0;
        let mut cur = self.first_in_score_range(min);
        while let Some(idx) = cur {
            let node = &self.nodes[idx];
            if !max.admits_from_above(node.score) {
                break;
            }
            n += 1;
            cur = node.links[0].next;
        }
        n
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, f64)> {
        let mut cur = self.nodes[HEAD].links[0].next;
        std::iter::from_fn(move || {
            let idx = cur?;
            let node = &self.nodes[idx];
            cur = node.links[0].next;
            Some((&node.member, node.score))
        })
    }
}
