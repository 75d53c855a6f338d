//! From-scratch canonical-LR(1) table builder. No module in the corpus
//! implements this: the teacher parses with `nom` combinators and the
//! original implementation consumed pre-generated tables from an external
//! build step. This is standard closure/goto construction over LR(1) item
//! sets (see any compiler-construction reference); the runtime engine in
//! `engine.rs` treats its output as opaque tables, so it would run equally
//! well against tables generated ahead of time by a separate tool.

use super::grammar::Grammar;
use super::symbol::{Nonterminal, Symbol};
use crate::lexer::TokenKind;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Shift(usize),
    Reduce(usize),
    Accept,
}

/// `action[(state, terminal)]` / `goto_table[(state, nonterminal)]`. Stored
/// as maps rather than dense 2D arrays: the grammar is small enough that a
/// sparse representation is both simpler and exactly as fast in practice,
/// and it sidesteps needing a second terminal-indexing scheme alongside
/// `TokenKind` itself.
#[derive(Debug)]
pub struct ParserTables {
    pub action: HashMap<(usize, TokenKind), Action>,
    pub goto_table: HashMap<(usize, Nonterminal), usize>,
    pub start_state: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Item {
    production: usize,
    dot: usize,
    lookahead: TokenKind,
}

type ItemSet = BTreeSet<Item>;

struct Builder<'g> {
    productions: &'g [super::grammar::Production],
    first_sets: HashMap<Nonterminal, HashSet<TokenKind>>,
    nullable: HashSet<Nonterminal>,
}

impl<'g> Builder<'g> {
    fn rhs_of(&self, item: &Item) -> &[Symbol] {
        &self.productions[item.production].rhs
    }

    fn symbol_at_dot(&self, item: &Item) -> Option<Symbol> {
        self.rhs_of(item).get(item.dot).copied()
    }

    /// FIRST of a symbol string followed by a trailing lookahead, per the
    /// standard LR(1) closure rule: FIRST(rest) union (lookahead if rest is
    /// nullable).
    fn first_of_sequence(&self, symbols: &[Symbol], trailing: TokenKind) -> HashSet<TokenKind> {
        let mut out = HashSet::new();
        let mut all_nullable = true;
        for symbol in symbols {
            match symbol {
                Symbol::Terminal(k) => {
                    out.insert(*k);
                    all_nullable = false;
                    break;
                }
                Symbol::Nonterminal(nt) => {
                    out.extend(self.first_sets.get(nt).cloned().unwrap_or_default());
                    if !self.nullable.contains(nt) {
                        all_nullable = false;
                        break;
                    }
                }
                Symbol::Epsilon => {}
            }
        }
        if all_nullable {
            out.insert(trailing);
        }
        out
    }

    fn closure(&self, items: ItemSet) -> ItemSet {
        let mut set = items;
        loop {
            let mut added = Vec::new();
            for item in &set {
                if let Some(Symbol::Nonterminal(nt)) = self.symbol_at_dot(item) {
                    let rest = &self.rhs_of(item)[item.dot + 1..];
                    let lookaheads = self.first_of_sequence(rest, item.lookahead);
                    for (production_index, production) in self.productions.iter().enumerate() {
                        if production.lhs != nt {
                            continue;
                        }
                        for &la in &lookaheads {
                            let candidate = Item { production: production_index, dot: 0, lookahead: la };
                            if !set.contains(&candidate) {
                                added.push(candidate);
                            }
                        }
                    }
                }
            }
            if added.is_empty() {
                break;
            }
            set.extend(added);
        }
        set
    }

    fn goto(&self, items: &ItemSet, symbol: Symbol) -> ItemSet {
        let mut moved = BTreeSet::new();
        for item in items {
            if self.symbol_at_dot(item) == Some(symbol) {
                moved.insert(Item { production: item.production, dot: item.dot + 1, lookahead: item.lookahead });
            }
        }
        self.closure(moved)
    }
}

/// Builds the canonical collection and derives `action`/`goto` tables from
/// it, resolving shift/reduce conflicts in favor of shift (as yacc-family
/// tools default) and reduce/reduce conflicts in favor of the
/// earliest-declared production. The layered-precedence grammar in
/// `grammar.rs` produces none of either in practice; the resolution rule
/// exists only as a defined fallback.
pub fn build(grammar: &Grammar) -> ParserTables {
    let productions = &grammar.productions;
    let augmented_start = productions.len();
    let mut all_productions = productions.clone();
    all_productions.push(super::grammar::Production {
        lhs: Nonterminal::AugmentedStart,
        rhs: vec![Symbol::Nonterminal(grammar.start)],
        tag: "augmented_start",
    });

    let (first_sets, nullable) = compute_first_sets(&all_productions);
    let builder = Builder {
        productions: &all_productions,
        first_sets,
        nullable,
    };

    let start_item = Item { production: augmented_start, dot: 0, lookahead: TokenKind::Eof };
    let start_set = builder.closure(BTreeSet::from([start_item]));

    let mut states: Vec<ItemSet> = vec![start_set];
    let mut state_index: HashMap<ItemSet, usize> = HashMap::new();
    state_index.insert(states[0].clone(), 0);

    let mut action: HashMap<(usize, TokenKind), Action> = HashMap::new();
    let mut goto_table: HashMap<(usize, Nonterminal), usize> = HashMap::new();

    let mut frontier = vec![0usize];
    while let Some(state_id) = frontier.pop() {
        let items = states[state_id].clone();

        let mut symbols: BTreeSet<SymbolKey> = BTreeSet::new();
        for item in &items {
            if let Some(symbol) = builder.symbol_at_dot(item) {
                symbols.insert(SymbolKey(symbol));
            }
        }

        for SymbolKey(symbol) in symbols {
            let target = builder.goto(&items, symbol);
            if target.is_empty() {
                continue;
            }
            let target_id = if let Some(&id) = state_index.get(&target) {
                id
            } else {
                let id = states.len();
                states.push(target.clone());
                state_index.insert(target, id);
                frontier.push(id);
                id
            };

            match symbol {
                Symbol::Terminal(kind) => {
                    action.entry((state_id, kind)).or_insert(Action::Shift(target_id));
                }
                Symbol::Nonterminal(nt) => {
                    goto_table.insert((state_id, nt), target_id);
                }
                Symbol::Epsilon => {}
            }
        }

        for item in &items {
            if item.dot == all_productions[item.production].rhs.len() {
                if item.production == augmented_start {
                    action.entry((state_id, TokenKind::Eof)).or_insert(Action::Accept);
                } else {
                    action
                        .entry((state_id, item.lookahead))
                        .or_insert(Action::Reduce(item.production));
                }
            }
        }
    }

    ParserTables { action, goto_table, start_state: 0 }
}

/// `Symbol` doesn't implement `Ord` (it'd need to order `TokenKind`, which
/// has no natural order); this newtype gives it one via discriminant +
/// debug-format tiebreak so it can live in a `BTreeSet` during state
/// construction.
#[derive(PartialEq, Eq)]
struct SymbolKey(Symbol);

impl PartialOrd for SymbolKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SymbolKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        format!("{:?}", self.0).cmp(&format!("{:?}", other.0))
    }
}

fn compute_first_sets(
    productions: &[super::grammar::Production],
) -> (HashMap<Nonterminal, HashSet<TokenKind>>, HashSet<Nonterminal>) {
    let mut first_sets: HashMap<Nonterminal, HashSet<TokenKind>> = HashMap::new();
    let mut nullable: HashSet<Nonterminal> = HashSet::new();
    for nt in Nonterminal::ALL {
        first_sets.insert(*nt, HashSet::new());
    }

    loop {
        let mut changed = false;
        for production in productions {
            let mut rhs_nullable = true;
            let mut derived: HashSet<TokenKind> = HashSet::new();
            for symbol in &production.rhs {
                match symbol {
                    Symbol::Terminal(k) => {
                        derived.insert(*k);
                        rhs_nullable = false;
                        break;
                    }
                    Symbol::Nonterminal(nt) => {
                        derived.extend(first_sets[nt].clone());
                        if !nullable.contains(nt) {
                            rhs_nullable = false;
                            break;
                        }
                    }
                    Symbol::Epsilon => {}
                }
            }
            if production.rhs.is_empty() {
                rhs_nullable = true;
            }

            let entry = first_sets.get_mut(&production.lhs).unwrap();
            let before = entry.len();
            entry.extend(derived);
            if entry.len() != before {
                changed = true;
            }
            if rhs_nullable && nullable.insert(production.lhs) {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    (first_sets, nullable)
}
