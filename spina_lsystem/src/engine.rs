// L-system derivation engine.
//
// The engine grows plants stage by stage and writes the command log. It
// owns three step buffers:
//
// - `rules`: the steps being grown at the current stage;
// - `rewrites`: what growing them produced, the next stage's rules;
// - `result`: scratch for the production currently being invoked.
//
// Growing a stage performs every rule in order. A command line is copied to
// `rewrites` verbatim, so every later stage carries the full derivation so
// far. A terminal invocation executes into command lines. A production
// invocation runs the production body: command lines it returns take its
// place at once, while returned rules are run through the parameter
// supplier and appended to `rewrites` as pending steps. A table is resolved
// by the selector and the chosen candidate performed.
//
// Driving loop for a batch of plants:
//
//   while engine.next_plant()? {
//       while engine.next_stage()? {
//           engine.grow()?;
//       }
//   }
//
// `run` wraps this (and the single-plant form when `Plants` is 0).
//
// Only stages in `[stage0, stage1]` are logged; `Grain_count` deltas narrow
// that range to a single stage per plant.
//
// See also: `accumulator.rs` for the append protocol, `selector.rs` for
// table selection, `schedule.rs` for per-plant delta stepping,
// `command_log.rs` for the output sink.
//
// **Critical constraint: determinism.** Given the same grammar, store and
// seed, the log is byte-identical across runs. All randomness comes from
// the two streams derived from the seed: `Random` in the store (parameter
// suppliers) and the selector stream owned here (table draws).

use crate::accumulator::{AppendStatus, Invocation, ResultBuffer, Step, Target};
use crate::command_log::{CommandLog, is_command_line};
use crate::error::LsysError;
use crate::grammar::{Context, Expansion, Grammar};
use crate::params::{ParamStore, Value};
use crate::schedule::{combinations, resolve_plant};
use crate::selector::{SelectorKey, select};
use crate::terminal::Terminal;
use serde::Serialize;
use spina_prng::PlantRng;

/// Stream id of the selector's generator (stream 0 is `Random`).
pub const SELECTOR_STREAM: u64 = 1;

/// Where the current plant is in its derivation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Stage 0: the axiom has not been invoked yet.
    AwaitingAxiom,
    Growing,
    Finished,
}

/// Summary of a finished run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub plants: u32,
    /// Stages grown, over all plants.
    pub stages: u32,
    /// Executable command lines written to the log.
    pub commands_written: u64,
    /// Rule lists cut short by an unclassifiable rule.
    pub dropped_rules: u32,
    /// Tables for which no candidate was selected.
    pub selections_dropped: u32,
}

/// What invoking one step produced.
enum Outcome {
    /// Command lines, from a terminal or a directly drawing production.
    Direct(Vec<String>),
    /// A production's expansion.
    Deferred(Vec<Step>),
}

pub struct Engine {
    grammar: Grammar,
    store: ParamStore,
    selector_rng: PlantRng,
    log: CommandLog,
    rules: Vec<Step>,
    rewrites: Vec<Step>,
    result: ResultBuffer,
    phase: Phase,
    report: RunReport,
}

impl Engine {
    /// Validate `grammar` and start the log with the run's seed.
    pub fn new(grammar: Grammar, store: ParamStore, log: CommandLog) -> Result<Self, LsysError> {
        grammar.validate()?;
        let distinct = combinations(&store.deltas);
        if !store.deltas.is_empty() && u64::from(store.plants) > distinct {
            tracing::warn!(
                plants = store.plants,
                distinct,
                "more plants than delta combinations, parameter settings repeat"
            );
        }
        let selector_rng = PlantRng::stream(store.seed, SELECTOR_STREAM);
        let mut engine = Self {
            grammar,
            store,
            selector_rng,
            log,
            rules: Vec::new(),
            rewrites: Vec::new(),
            result: ResultBuffer::new(),
            phase: Phase::AwaitingAxiom,
            report: RunReport::default(),
        };
        engine
            .log
            .write_line(&format!("# seed: {}", engine.store.seed))?;
        Ok(engine)
    }

    pub fn store(&self) -> &ParamStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ParamStore {
        &mut self.store
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Steps waiting to be grown at the current stage.
    pub fn rules(&self) -> &[Step] {
        &self.rules
    }

    /// What the last `grow` produced.
    pub fn rewrites(&self) -> &[Step] {
        &self.rewrites
    }

    /// Start the next plant of the batch, or close the log and return
    /// `false` when none are left.
    pub fn next_plant(&mut self) -> Result<bool, LsysError> {
        if self.store.plants == 0 {
            self.log.close()?;
            return Ok(false);
        }

        self.store.plant_nr += 1;
        let plant_nr = self.store.plant_nr;
        for (name, value) in resolve_plant(&self.store.deltas, plant_nr) {
            self.store.apply_delta(&name, value);
        }
        self.store.plants -= 1;

        self.log.write_raw(&format!(
            "\n#{}\n\tplantnr({plant_nr})\t# Start\n",
            "-".repeat(68)
        ))?;
        self.report.commands_written += 1;
        for delta in &self.store.deltas {
            let value = self
                .store
                .get(&delta.name)
                .map_or_else(String::new, |v| v.to_string());
            self.log.write_raw(&format!(
                "\n# Plant: {plant_nr}: has parameter {}: {value}",
                delta.name
            ))?;
        }
        self.log.write_raw("\n")?;

        self.store.stage = 0;
        self.log.write_raw(&format!(
            "\n# stage: 0, stage0:{}, stage1: {}\n",
            self.store.stage0, self.store.stage1
        ))?;

        self.rules.clear();
        self.rewrites.clear();
        self.result.clear();
        self.phase = Phase::AwaitingAxiom;
        self.report.plants += 1;
        tracing::info!(
            plant = plant_nr,
            remaining = self.store.plants,
            stage0 = self.store.stage0,
            stage1 = self.store.stage1,
            "plant started"
        );
        Ok(true)
    }

    /// Advance to the next stage. At stage 0 this first invokes the axiom.
    /// Returns `false` (and writes `finish`) once `stage1` is reached.
    pub fn next_stage(&mut self) -> Result<bool, LsysError> {
        match self.phase {
            Phase::Finished => return Ok(false),
            Phase::AwaitingAxiom => {
                let axiom = Invocation::production(self.grammar.axiom(), &[]);
                self.rules = match self.invoke(&axiom)? {
                    Outcome::Deferred(steps) => steps,
                    Outcome::Direct(lines) => lines.into_iter().map(Step::Line).collect(),
                };
                if self.store.stage_in_range(0) {
                    log_steps(&mut self.log, &mut self.report, &self.rules)?;
                }
                self.phase = Phase::Growing;
            }
            Phase::Growing => {}
        }

        let stage = self.store.stage;
        if stage < self.store.stage1 {
            if self.store.stage_in_range(stage + 1) {
                self.log.write_line(&format!("\n# stage: {}", stage + 1))?;
            }
            if stage > 0 {
                self.rules = std::mem::take(&mut self.rewrites);
            }
            self.store.stage += 1;
            tracing::debug!(stage = self.store.stage, rules = self.rules.len(), "stage");
            Ok(true)
        } else {
            self.rules.clear();
            self.rewrites.clear();
            self.result.clear();
            self.log
                .write_line(&format!("\tfinish({})", self.store.plant_nr))?;
            self.report.commands_written += 1;
            self.phase = Phase::Finished;
            if self.store.plants == 0 {
                self.log.close()?;
            }
            Ok(false)
        }
    }

    /// Grow the current stage: perform every rule into `rewrites` and log
    /// them if the stage is in range.
    pub fn grow(&mut self) -> Result<(), LsysError> {
        let rules = std::mem::take(&mut self.rules);
        self.rewrites.clear();
        for step in rules {
            self.perform(step)?;
        }
        self.report.stages += 1;
        if self.store.stage_in_range(self.store.stage) {
            log_steps(&mut self.log, &mut self.report, &self.rewrites)?;
        }
        Ok(())
    }

    /// Grow plants until the batch (or the single plant when `Plants` is 0)
    /// is finished, then close the log.
    pub fn run(&mut self) -> Result<RunReport, LsysError> {
        if self.store.plants == 0 {
            self.report.plants = 1;
            while self.next_stage()? {
                self.grow()?;
            }
        } else {
            while self.next_plant()? {
                while self.next_stage()? {
                    self.grow()?;
                }
            }
        }
        self.log.close()?;
        tracing::info!(
            plants = self.report.plants,
            stages = self.report.stages,
            commands = self.report.commands_written,
            "run finished"
        );
        Ok(self.report.clone())
    }

    fn perform(&mut self, step: Step) -> Result<(), LsysError> {
        match step {
            Step::Line(_) => self.rewrites.push(step),
            Step::Invoke(invocation) => match self.invoke(&invocation)? {
                Outcome::Direct(lines) => self.rewrites.extend(lines.into_iter().map(Step::Line)),
                Outcome::Deferred(steps) => self.rewrites.extend(steps),
            },
            Step::Choose(entries) => {
                if let Some(chosen) = self.choose(&entries)? {
                    for step in chosen {
                        self.perform(step)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Select one candidate of a table, tracing the draw when enabled.
    fn choose(
        &mut self,
        entries: &[(SelectorKey, Vec<Step>)],
    ) -> Result<Option<Vec<Step>>, LsysError> {
        let selection = select(entries, &self.store, &mut self.selector_rng);
        let Some(candidate) = selection.candidate else {
            self.report.selections_dropped += 1;
            return Ok(None);
        };
        if let (Some(r), Some(key)) = (selection.draw, selection.key) {
            if self.store.log_selections && self.store.stage_in_range(self.store.stage) {
                let rule: Vec<String> = candidate.iter().map(Step::to_string).collect();
                self.log.write_line(&format!(
                    "# Rand0to1: {r:.4} leads to key: {key} rule: {}",
                    rule.join("")
                ))?;
            }
        }
        Ok(Some(candidate.clone()))
    }

    fn invoke(&mut self, invocation: &Invocation) -> Result<Outcome, LsysError> {
        let name = match &invocation.target {
            Target::Terminal(terminal) => {
                let lines = terminal
                    .execute(invocation.params.as_ref())
                    .unwrap_or_default();
                return Ok(Outcome::Direct(lines));
            }
            Target::Production(name) => name,
        };
        let production = self
            .grammar
            .get(name)
            .ok_or_else(|| LsysError::UnknownProduction(name.clone()))?;

        // Arguments are bound now, at invocation, and published for the
        // grammar and condition keys.
        self.store.set(
            &format!("{name}_args"),
            Value::List(invocation.args.to_vec()),
        );
        let expansion = {
            let mut ctx = Context {
                name,
                args: &invocation.args,
                store: &mut self.store,
            };
            (production.body)(&mut ctx)
        };
        let rules = match expansion {
            Expansion::Direct(lines) => return Ok(Outcome::Direct(lines)),
            Expansion::Rules(rules) => rules,
        };
        let params = production
            .supplier
            .as_ref()
            .map(|supplier| supplier(&mut self.store));

        let status = self
            .result
            .append_rules(&self.grammar, params.as_ref(), &rules)?;
        if let AppendStatus::Stopped(unknown) = status {
            self.report.dropped_rules += 1;
            tracing::warn!(production = %name, %unknown, "rule list cut short");
        }
        Ok(Outcome::Deferred(self.result.drain()))
    }
}

/// Log steps in the command-log notation: command lines verbatim, pending
/// calls as `#->\t(...)`, pending branch brackets as `#\tSave()` and
/// `#\tRestore()`, and pending tables as `#?\t{...}`.
fn log_steps(log: &mut CommandLog, report: &mut RunReport, steps: &[Step]) -> Result<(), LsysError> {
    for step in steps {
        match step {
            Step::Line(line) => {
                log.write_line(line)?;
                if is_command_line(line) {
                    report.commands_written += 1;
                }
            }
            Step::Invoke(Invocation {
                target: Target::Terminal(terminal @ (Terminal::Save | Terminal::Restore)),
                ..
            }) => log.write_line(&format!("#\t{}()", terminal.name()))?,
            Step::Invoke(invocation) => {
                log.write_line(&format!("#->\t({})", invocation.describe()))?;
            }
            Step::Choose(_) => log.write_line(&format!("#?\t{step}"))?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_log::MemorySink;
    use crate::params::{Delta, ParamMap};
    use crate::rule::Rule;

    fn stalk_params() -> ParamMap {
        let mut p = ParamMap::new();
        p.insert("draw".into(), Value::pair(5.0, 1.0));
        p.insert("rule".into(), Value::from("Stalk"));
        p
    }

    fn grammar() -> Grammar {
        Grammar::new("Axiom")
            .production("Axiom", |_| vec![Rule::bare("Stalk")])
            .production_with_params("Stalk", |_| Rule::bares(&["Draw"]), |_| stalk_params())
    }

    fn engine(store: ParamStore) -> (Engine, MemorySink) {
        let sink = MemorySink::new();
        let engine = Engine::new(grammar(), store, CommandLog::from_writer(sink.clone())).unwrap();
        (engine, sink)
    }

    #[test]
    fn stage_loop_grows_and_finishes() {
        let (mut engine, sink) = engine(ParamStore::new(7).with_stages(0, 3));
        assert!(engine.next_stage().unwrap());
        assert_eq!(engine.phase(), Phase::Growing);
        assert_eq!(engine.store().stage, 1);
        engine.grow().unwrap();
        // Stalk expanded into a pending Draw.
        assert!(matches!(engine.rewrites(), [Step::Invoke(_)]));

        assert!(engine.next_stage().unwrap());
        engine.grow().unwrap();
        assert!(matches!(engine.rewrites(), [Step::Line(_)]));

        assert!(engine.next_stage().unwrap());
        engine.grow().unwrap();
        assert!(!engine.next_stage().unwrap());
        assert_eq!(engine.phase(), Phase::Finished);
        assert!(!engine.next_stage().unwrap());

        let log = sink.contents();
        assert!(log.starts_with("# seed: 7\n"));
        assert!(log.contains("#->\t(Stalk)"));
        assert!(log.contains("#->\t(Draw,{'draw':(5.0000,1.0000),'rule':'Stalk',})"));
        for stage in 1..=3 {
            assert!(log.contains(&format!("\n# stage: {stage}\n")));
        }
        assert!(log.contains("\tfinish(0)\n"));
        // Stage 3 re-emits the stage 2 draw.
        assert_eq!(log.matches("draw(length=5.0000,width=1.0000)").count(), 2);
        assert_eq!(engine.report().stages, 3);
    }

    #[test]
    fn args_are_published() {
        let g = Grammar::new("Axiom")
            .production("Axiom", |_| vec![Rule::call("Stalk", [2.5])])
            .production("Stalk", |ctx| {
                let x = ctx.args.first().and_then(Value::as_f64).unwrap_or(0.0);
                ctx.store.set("seen", x);
                Vec::new()
            });
        let store = ParamStore::new(1).with_stages(0, 1);
        let mut engine = Engine::new(g, store, CommandLog::from_writer(MemorySink::new())).unwrap();
        engine.run().unwrap();
        assert_eq!(engine.store().get("seen"), Some(Value::Float(2.5)));
        assert_eq!(
            engine.store().get("Stalk_args"),
            Some(Value::List(vec![Value::Float(2.5)]))
        );
    }

    #[test]
    fn dropped_rules_are_counted() {
        let g = Grammar::new("Axiom").production("Axiom", |_| vec![Rule::bare("Leaf")]);
        let mut engine = Engine::new(
            g,
            ParamStore::new(1).with_stages(0, 1),
            CommandLog::from_writer(MemorySink::new()),
        )
        .unwrap();
        let report = engine.run().unwrap();
        assert_eq!(report.dropped_rules, 1);
    }

    #[test]
    fn batch_writes_plant_headers() {
        let mut store = ParamStore::new(3).with_stages(0, 1);
        store.plants = 2;
        store.deltas = vec![Delta::new("awn_length", [0.8, 1.2])];
        let (mut engine, sink) = engine(store);
        let report = engine.run().unwrap();
        assert_eq!(report.plants, 2);
        assert_eq!(report.stages, 2);

        let log = sink.contents();
        assert!(log.contains("\tplantnr(1)\t# Start\n"));
        assert!(log.contains("\n# Plant: 1: has parameter awn_length: 0.8"));
        assert!(log.contains("\n# Plant: 2: has parameter awn_length: 1.2"));
        assert!(log.contains("\n# stage: 0, stage0:0, stage1: 1\n"));
        assert!(log.contains("\tfinish(2)\n"));
        assert!(log.contains(&format!("\n#{}\n", "-".repeat(68))));
        assert!(log.ends_with("\n\n"));
    }

    #[test]
    fn plant_and_finish_lines_are_counted() {
        let mut store = ParamStore::new(3).with_stages(0, 2);
        store.plants = 2;
        let (mut engine, sink) = engine(store);
        let report = engine.run().unwrap();
        let log = sink.contents();
        let counted = log.lines().filter(|l| is_command_line(l)).count() as u64;
        // Per plant: plantnr, the stage 2 draw, finish.
        assert_eq!(counted, 6);
        assert_eq!(report.commands_written, counted);
    }

    #[test]
    fn selection_trace_is_logged() {
        let g = Grammar::new("Axiom")
            .production("Axiom", |_| {
                vec![Rule::weighted([(10.5, Rule::bare("Stalk")), (20.5, Rule::bare("Stalk"))])]
            })
            .production_with_params("Stalk", |_| Rule::bares(&["Draw"]), |_| stalk_params());
        let mut store = ParamStore::new(5).with_stages(0, 2);
        store.log_selections = true;
        let sink = MemorySink::new();
        let mut engine = Engine::new(g, store, CommandLog::from_writer(sink.clone())).unwrap();
        engine.run().unwrap();
        // The weights sum to one, so a candidate is always chosen.
        let log = sink.contents();
        assert!(log.contains("#?\t{10.5000:(Stalk),20.5000:(Stalk),}"));
        assert!(log.contains("# Rand0to1: "));
        assert!(log.contains(" rule: (Stalk)"));
        assert_eq!(engine.report().selections_dropped, 0);
    }

    #[test]
    fn unknown_axiom_is_rejected() {
        let g = Grammar::new("Start").production("Axiom", |_| Vec::new());
        let err = Engine::new(g, ParamStore::new(0), CommandLog::from_writer(MemorySink::new()));
        assert!(matches!(err, Err(LsysError::MissingAxiom(_))));
    }
}
