// Grammar registration table.
//
// A grammar is a fixed set of named productions registered once at startup,
// each with an optional parameter supplier. Registration is the sole source
// of truth for whether a name is a production ("main rule"): `rule::classify`
// asks `Grammar::is_main_rule`, never inspects the callable.
//
// A production body runs with a `Context` giving it the shared parameter
// store and its bound call arguments, and returns its `Expansion`: either
// rules, which are queued as pending steps for the next stage, or command
// lines, which take the production's place in the current stage. For a
// rule expansion the supplier, if any, runs right after the body and
// returns the parameter mapping attached to every terminal the expansion
// queues. A direct expansion carries its own parameters and skips it.
//
// See also: `engine.rs` which invokes productions, `wheat.rs` for the
// built-in wheat-head grammar.

use crate::error::LsysError;
use crate::params::{ParamMap, ParamStore, Value};
use crate::rule::Rule;
use crate::terminal::Terminal;
use rustc_hash::FxHashMap;

/// What a production body sees while it runs.
pub struct Context<'a> {
    /// Name of the production being invoked.
    pub name: &'a str,
    /// Arguments queued with the call, bound now.
    pub args: &'a [Value],
    /// The shared parameter store.
    pub store: &'a mut ParamStore,
}

/// What a production body hands back.
#[derive(Clone, Debug, PartialEq)]
pub enum Expansion {
    /// Rules queued as pending steps for the next stage.
    Rules(Vec<Rule>),
    /// Command lines written in place of the production, this stage.
    Direct(Vec<String>),
}

impl Expansion {
    /// Execute `terminal` now with `params`. A terminal whose parameters
    /// are missing or malformed yields no lines.
    pub fn command(terminal: Terminal, params: &ParamMap) -> Self {
        Self::Direct(terminal.execute(Some(params)).unwrap_or_default())
    }
}

impl From<Vec<Rule>> for Expansion {
    fn from(rules: Vec<Rule>) -> Self {
        Self::Rules(rules)
    }
}

pub type ProductionFn = Box<dyn Fn(&mut Context<'_>) -> Expansion>;
pub type SupplierFn = Box<dyn Fn(&mut ParamStore) -> ParamMap>;

/// A registered production.
pub struct Production {
    pub body: ProductionFn,
    pub supplier: Option<SupplierFn>,
}

/// The registration table: production name → (body, optional supplier).
pub struct Grammar {
    axiom: String,
    productions: FxHashMap<String, Production>,
    /// Registration order, for deterministic listing.
    order: Vec<String>,
}

impl Grammar {
    /// An empty grammar whose start production is `axiom`.
    pub fn new(axiom: &str) -> Self {
        Self {
            axiom: axiom.to_string(),
            productions: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Register a production without a parameter supplier.
    pub fn production<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Vec<Rule> + 'static,
    {
        self.register(name, Box::new(move |ctx| Expansion::Rules(body(ctx))), None)
    }

    /// Register a production together with its parameter supplier.
    pub fn production_with_params<F, S>(self, name: &str, body: F, supplier: S) -> Self
    where
        F: Fn(&mut Context<'_>) -> Vec<Rule> + 'static,
        S: Fn(&mut ParamStore) -> ParamMap + 'static,
    {
        self.register(
            name,
            Box::new(move |ctx| Expansion::Rules(body(ctx))),
            Some(Box::new(supplier)),
        )
    }

    /// Register a production whose body picks its own `Expansion`, for
    /// productions that can draw directly.
    pub fn expanding<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Expansion + 'static,
    {
        self.register(name, Box::new(body), None)
    }

    /// `expanding` with a supplier for its rule expansions.
    pub fn expanding_with_params<F, S>(self, name: &str, body: F, supplier: S) -> Self
    where
        F: Fn(&mut Context<'_>) -> Expansion + 'static,
        S: Fn(&mut ParamStore) -> ParamMap + 'static,
    {
        self.register(name, Box::new(body), Some(Box::new(supplier)))
    }

    fn register(mut self, name: &str, body: ProductionFn, supplier: Option<SupplierFn>) -> Self {
        if !self.productions.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.productions
            .insert(name.to_string(), Production { body, supplier });
        self
    }

    pub fn axiom(&self) -> &str {
        &self.axiom
    }

    /// Whether `name` is a registered production.
    pub fn is_main_rule(&self, name: &str) -> bool {
        self.productions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Production> {
        self.productions.get(name)
    }

    /// Production names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Check the grammar can run: the axiom exists and no production hides
    /// a built-in terminal (terminals win name resolution, so such a
    /// production could never be invoked).
    pub fn validate(&self) -> Result<(), LsysError> {
        if !self.is_main_rule(&self.axiom) {
            return Err(LsysError::MissingAxiom(self.axiom.clone()));
        }
        if let Some(name) = self.names().find(|n| Terminal::from_name(n).is_some()) {
            return Err(LsysError::ShadowedTerminal(name.to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("axiom", &self.axiom)
            .field("productions", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_the_source_of_truth() {
        let g = Grammar::new("Axiom")
            .production("Axiom", |_| vec![Rule::bare("Stalk")])
            .production_with_params("Stalk", |_| Vec::new(), |_| ParamMap::new());
        assert!(g.is_main_rule("Axiom"));
        assert!(g.is_main_rule("Stalk"));
        assert!(!g.is_main_rule("Grain"));
        assert!(g.get("Stalk").unwrap().supplier.is_some());
        assert!(g.get("Axiom").unwrap().supplier.is_none());
        assert_eq!(g.names().collect::<Vec<_>>(), vec!["Axiom", "Stalk"]);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn missing_axiom_is_rejected() {
        let g = Grammar::new("Axiom").production("Stalk", |_| Vec::new());
        assert!(matches!(g.validate(), Err(LsysError::MissingAxiom(name)) if name == "Axiom"));
    }

    #[test]
    fn shadowing_a_terminal_is_rejected() {
        let g = Grammar::new("Axiom")
            .production("Axiom", |_| Vec::new())
            .production("Draw", |_| Vec::new());
        assert!(matches!(g.validate(), Err(LsysError::ShadowedTerminal(name)) if name == "Draw"));
    }

    #[test]
    fn body_sees_args_and_store() {
        let g = Grammar::new("Axiom").production("Axiom", |ctx| {
            ctx.store.set("seen", ctx.args.len() as i64);
            vec![Rule::bare(ctx.name)]
        });
        let mut store = ParamStore::new(0);
        let args = [Value::Int(1), Value::Int(2)];
        let production = g.get("Axiom").unwrap();
        let mut ctx = Context {
            name: "Axiom",
            args: &args,
            store: &mut store,
        };
        let expansion = (production.body)(&mut ctx);
        assert_eq!(expansion, Expansion::Rules(vec![Rule::bare("Axiom")]));
        assert_eq!(store.get("seen"), Some(Value::Int(2)));
    }

    #[test]
    fn direct_body_executes_its_terminal() {
        let g = Grammar::new("Axiom").expanding("Axiom", |_| {
            let mut p = ParamMap::new();
            p.insert("draw".into(), Value::pair(2.0, 0.5));
            p.insert("rule".into(), Value::from("Axiom"));
            Expansion::command(Terminal::Draw, &p)
        });
        let mut store = ParamStore::new(0);
        let mut ctx = Context {
            name: "Axiom",
            args: &[],
            store: &mut store,
        };
        let Expansion::Direct(lines) = (g.get("Axiom").unwrap().body)(&mut ctx) else {
            panic!("expected a direct expansion");
        };
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("\tdraw(length=2.0000,width=0.5000)"));

        // Missing parameters draw nothing.
        assert_eq!(
            Expansion::command(Terminal::Draw, &ParamMap::new()),
            Expansion::Direct(Vec::new())
        );
    }
}
