use std::io::{self, Write};

use log::trace;

use crate::config::Config;
use crate::env::Environments;
use crate::error::{YalError, YalResult};
use crate::globals;
use crate::heap::{Closure, Heap, RegionExit};
use crate::primitives;
use crate::printer::print_val;
use crate::reader;
use crate::symbol::{sym, SymbolTable};
use crate::value::{FrameId, SymbolId, Value};

/// The closed set of special forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SpecialForm {
    Quote,
    If,
    Define,
    Lambda,
    Let,
    Set,
    Begin,
    Cond,
    And,
    Or,
}

impl SpecialForm {
    fn from_symbol(name: SymbolId) -> Option<Self> {
        Some(match name {
            sym::QUOTE => SpecialForm::Quote,
            sym::IF => SpecialForm::If,
            sym::DEFINE => SpecialForm::Define,
            sym::LAMBDA => SpecialForm::Lambda,
            sym::LET => SpecialForm::Let,
            sym::SET => SpecialForm::Set,
            sym::BEGIN => SpecialForm::Begin,
            sym::COND => SpecialForm::Cond,
            sym::AND => SpecialForm::And,
            sym::OR => SpecialForm::Or,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            SpecialForm::Quote => "quote",
            SpecialForm::If => "if",
            SpecialForm::Define => "define",
            SpecialForm::Lambda => "lambda",
            SpecialForm::Let => "let",
            SpecialForm::Set => "set!",
            SpecialForm::Begin => "begin",
            SpecialForm::Cond => "cond",
            SpecialForm::And => "and",
            SpecialForm::Or => "or",
        }
    }
}

/// The yal interpreter. All state lives here and is passed explicitly; two
/// interpreters never share an arena.
pub struct Interpreter {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub envs: Environments,
    config: Config,
    /// Current `eval` nesting.
    depth: usize,
    /// Destination of `print`, `write` and `newline`.
    output: Box<dyn Write>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut heap = Heap::new(config.arena_size);
        let mut symbols = SymbolTable::new();
        let mut envs = Environments::new();
        globals::install_globals(&mut heap, &mut symbols, &mut envs);
        Interpreter {
            heap,
            symbols,
            envs,
            config,
            depth: 0,
            output: Box::new(io::stdout()),
        }
    }

    /// Send program output to `output` instead of stdout.
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn write_output(&mut self, text: &str) -> YalResult<()> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|()| self.output.flush())
            .map_err(|e| YalError::Output(e.to_string()))
    }

    pub fn global_env(&self) -> FrameId {
        self.envs.global()
    }

    /// Render a value the way the REPL prints it.
    pub fn print(&self, val: Value) -> String {
        print_val(val, &self.heap, &self.symbols)
    }

    // === Regions ===

    /// Run `f` inside a fresh heap region. Blocks allocated by `f` are freed
    /// when it returns unless something escaped into an older structure.
    pub fn in_region<T>(&mut self, f: impl FnOnce(&mut Self) -> YalResult<T>) -> YalResult<T> {
        let region = self.heap.enter_region();
        let saved_depth = self.depth;
        let result = f(self);
        self.depth = saved_depth;

        match self.heap.leave_region()? {
            RegionExit::Released { .. } => self.envs.release_region(region),
            RegionExit::Merged { .. } => {
                let parent = self.heap.current_region();
                self.envs.merge_region(region, parent);
            }
        }
        result
    }

    // === Entry points ===

    /// Read and evaluate every expression in `input` in the current region,
    /// returning the last value (nil for empty input).
    pub fn eval_str(&mut self, input: &str) -> YalResult<Value> {
        let global = self.global_env();
        let mut pos = 0;
        let mut last = Value::Nil;
        while let Some((expr, next)) =
            reader::read_one_at(input, pos, &mut self.heap, &mut self.symbols)?
        {
            last = self.eval(expr, global)?;
            pos = next;
        }
        Ok(last)
    }

    /// Evaluate `input` in its own region and render the last value.
    pub fn eval_to_string(&mut self, input: &str) -> YalResult<String> {
        self.in_region(|interp| {
            let val = interp.eval_str(input)?;
            Ok(interp.print(val))
        })
    }

    /// Evaluate each expression of one logical REPL input in its own region.
    /// Returns one rendered result per expression. Evaluation errors are
    /// reported and the next expression still runs; a read error ends the line.
    pub fn run_line(&mut self, input: &str) -> Vec<YalResult<String>> {
        let global = self.global_env();
        let mut outputs = Vec::new();
        let mut pos = 0;
        loop {
            let step = self.in_region(|interp| {
                match reader::read_one_at(input, pos, &mut interp.heap, &mut interp.symbols)? {
                    Some((expr, next)) => {
                        let rendered = interp.eval(expr, global).map(|v| interp.print(v));
                        Ok(Some((rendered, next)))
                    }
                    None => Ok(None),
                }
            });
            match step {
                Ok(Some((rendered, next))) => {
                    outputs.push(rendered);
                    pos = next;
                }
                Ok(None) => break,
                Err(e) => {
                    outputs.push(Err(e));
                    break;
                }
            }
        }
        outputs
    }

    /// Evaluate text as if it were typed at the prompt line by line: lines are
    /// gathered until they hold complete expressions, and a read error only
    /// discards what was gathered so far.
    pub fn run_script(&mut self, input: &str) -> Vec<YalResult<String>> {
        let mut outputs = Vec::new();
        let mut buffer = String::new();
        for line in input.lines() {
            buffer.push_str(line);
            buffer.push('\n');
            if self.needs_more_input(&buffer) {
                continue;
            }
            outputs.extend(self.run_line(&buffer));
            buffer.clear();
        }
        if !buffer.trim().is_empty() {
            outputs.extend(self.run_line(&buffer));
        }
        outputs
    }

    /// True if `input` stops in the middle of an expression.
    pub fn needs_more_input(&mut self, input: &str) -> bool {
        let scan = self.in_region(|interp| {
            let mut pos = 0;
            while let Some((_, next)) =
                reader::read_one_at(input, pos, &mut interp.heap, &mut interp.symbols)?
            {
                pos = next;
            }
            Ok(())
        });
        matches!(scan, Err(e) if e.is_incomplete())
    }

    // === Evaluation ===

    /// Evaluate `expr` in `env`.
    pub fn eval(&mut self, expr: Value, env: FrameId) -> YalResult<Value> {
        if self.depth >= self.config.max_depth {
            return Err(YalError::DepthExceeded(self.config.max_depth));
        }
        self.depth += 1;
        let result = self.eval_inner(expr, env);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: Value, env: FrameId) -> YalResult<Value> {
        match expr {
            Value::Symbol(name) => self.lookup(env, name),
            Value::Pair(id) => {
                let head = self.heap.car(id);
                let args = self.heap.cdr(id);
                if let Some(form) = head.as_symbol().and_then(SpecialForm::from_symbol) {
                    return self.eval_special(form, args, env);
                }
                let f = self.eval(head, env)?;
                let arg_exprs = self
                    .heap
                    .list_to_vec(args)
                    .ok_or_else(|| YalError::Malformed("application".into()))?;
                let mut values = Vec::with_capacity(arg_exprs.len());
                for arg in arg_exprs {
                    values.push(self.eval(arg, env)?);
                }
                self.apply(f, &values)
            }
            atom => Ok(atom),
        }
    }

    fn lookup(&self, env: FrameId, name: SymbolId) -> YalResult<Value> {
        self.envs
            .lookup(env, name)
            .ok_or_else(|| YalError::Unbound(self.symbols.name(name).to_string()))
    }

    /// Apply a procedure to evaluated arguments.
    pub fn apply(&mut self, f: Value, args: &[Value]) -> YalResult<Value> {
        if self.config.trace {
            let rendered: Vec<String> = args.iter().map(|&a| self.print(a)).collect();
            trace!("apply {} to ({})", self.print(f), rendered.join(" "));
        }

        match f {
            Value::Primitive(prim) => primitives::call_primitive(self, prim, args),
            Value::Closure(id) => {
                let closure = self.heap.closure(id);
                let bindings = self.bind_params(&closure, args)?;
                let frame = self.envs.extend(&self.heap, closure.env, bindings);
                self.eval_body(closure.body, frame)
            }
            other => Err(YalError::NotCallable(self.print(other))),
        }
    }

    /// Pair parameters with arguments. A dotted tail or a bare symbol
    /// collects the remaining arguments into a list.
    fn bind_params(&mut self, closure: &Closure, args: &[Value]) -> YalResult<Vec<(SymbolId, Value)>> {
        let mut bindings = Vec::new();
        let mut params = closure.params;
        let mut remaining = args;
        loop {
            match params {
                Value::Nil => {
                    if !remaining.is_empty() {
                        return Err(self.arity_error(closure, args.len()));
                    }
                    return Ok(bindings);
                }
                Value::Symbol(rest) => {
                    let list = self.heap.list(remaining)?;
                    bindings.push((rest, list));
                    return Ok(bindings);
                }
                Value::Pair(p) => {
                    let name = self
                        .heap
                        .car(p)
                        .as_symbol()
                        .ok_or_else(|| YalError::Malformed("lambda parameter list".into()))?;
                    let (&first, tail) = match remaining.split_first() {
                        Some(split) => split,
                        None => return Err(self.arity_error(closure, args.len())),
                    };
                    bindings.push((name, first));
                    remaining = tail;
                    params = self.heap.cdr(p);
                }
                _ => return Err(YalError::Malformed("lambda parameter list".into())),
            }
        }
    }

    fn arity_error(&self, closure: &Closure, got: usize) -> YalError {
        let mut required = 0;
        let mut params = closure.params;
        while let Value::Pair(p) = params {
            required += 1;
            params = self.heap.cdr(p);
        }
        let expected = if params.is_nil() {
            required.to_string()
        } else {
            format!("at least {}", required)
        };
        let name = closure.name.map_or("lambda", |n| self.symbols.name(n));
        YalError::arity(name, expected, got)
    }

    /// Evaluate a body (list of expressions) and return the last value.
    fn eval_body(&mut self, body: Value, env: FrameId) -> YalResult<Value> {
        let mut result = Value::Nil;
        let mut current = body;
        loop {
            match current {
                Value::Nil => return Ok(result),
                Value::Pair(id) => {
                    result = self.eval(self.heap.car(id), env)?;
                    current = self.heap.cdr(id);
                }
                _ => return Err(YalError::Malformed("body".into())),
            }
        }
    }

    // === Special forms ===

    fn eval_special(&mut self, form: SpecialForm, args: Value, env: FrameId) -> YalResult<Value> {
        let malformed = || YalError::Malformed(form.name().to_string());
        let parts = self.heap.list_to_vec(args).ok_or_else(malformed)?;

        match form {
            SpecialForm::Quote => match parts.as_slice() {
                [datum] => Ok(*datum),
                _ => Err(malformed()),
            },

            SpecialForm::If => {
                let (test, then, otherwise) = match parts.as_slice() {
                    [test, then] => (*test, *then, None),
                    [test, then, otherwise] => (*test, *then, Some(*otherwise)),
                    _ => return Err(malformed()),
                };
                if self.eval(test, env)?.is_truthy() {
                    self.eval(then, env)
                } else {
                    otherwise.map_or(Ok(Value::Nil), |e| self.eval(e, env))
                }
            }

            SpecialForm::Define => match parts.as_slice() {
                [Value::Symbol(name), expr] => {
                    let val = self.eval(*expr, env)?;
                    if let Value::Closure(id) = val {
                        self.heap.name_closure(id, *name);
                    }
                    self.envs.define(&mut self.heap, env, *name, val);
                    Ok(Value::Symbol(*name))
                }
                // (define (name . params) body...)
                [Value::Pair(signature), _, ..] => {
                    let name = self.heap.car(*signature).as_symbol().ok_or_else(malformed)?;
                    let params = self.heap.cdr(*signature);
                    let body = self.heap.cdr_val(args)?;
                    let closure = self.make_closure(params, body, env, Some(name))?;
                    self.envs.define(&mut self.heap, env, name, closure);
                    Ok(Value::Symbol(name))
                }
                _ => Err(malformed()),
            },

            SpecialForm::Lambda => {
                if parts.len() < 2 {
                    return Err(malformed());
                }
                let body = self.heap.cdr_val(args)?;
                self.make_closure(parts[0], body, env, None)
            }

            SpecialForm::Let => {
                if parts.len() < 2 {
                    return Err(malformed());
                }
                let specs = self.heap.list_to_vec(parts[0]).ok_or_else(malformed)?;
                let mut bindings = Vec::with_capacity(specs.len());
                for binding in specs {
                    match self.heap.list_to_vec(binding).as_deref() {
                        Some([Value::Symbol(name), expr]) => {
                            bindings.push((*name, self.eval(*expr, env)?));
                        }
                        _ => return Err(malformed()),
                    }
                }
                let frame = self.envs.extend(&self.heap, env, bindings);
                let body = self.heap.cdr_val(args)?;
                self.eval_body(body, frame)
            }

            SpecialForm::Set => match parts.as_slice() {
                [Value::Symbol(name), expr] => {
                    let val = self.eval(*expr, env)?;
                    if self.envs.set(&mut self.heap, env, *name, val) {
                        Ok(val)
                    } else {
                        Err(YalError::Unbound(self.symbols.name(*name).to_string()))
                    }
                }
                _ => Err(malformed()),
            },

            SpecialForm::Begin => self.eval_body(args, env),

            SpecialForm::Cond => {
                for clause in parts {
                    let items = self.heap.list_to_vec(clause).ok_or_else(malformed)?;
                    let (&test, _) = items.split_first().ok_or_else(malformed)?;
                    let outcome = if test == Value::Symbol(sym::ELSE) {
                        Value::Bool(true)
                    } else {
                        self.eval(test, env)?
                    };
                    if outcome.is_truthy() {
                        if items.len() == 1 {
                            return Ok(outcome);
                        }
                        let body = self.heap.cdr_val(clause)?;
                        return self.eval_body(body, env);
                    }
                }
                Ok(Value::Nil)
            }

            SpecialForm::And => {
                let mut result = Value::Bool(true);
                for expr in parts {
                    result = self.eval(expr, env)?;
                    if !result.is_truthy() {
                        break;
                    }
                }
                Ok(result)
            }

            SpecialForm::Or => {
                let mut result = Value::Bool(false);
                for expr in parts {
                    result = self.eval(expr, env)?;
                    if result.is_truthy() {
                        break;
                    }
                }
                Ok(result)
            }
        }
    }

    fn make_closure(
        &mut self,
        params: Value,
        body: Value,
        env: FrameId,
        name: Option<SymbolId>,
    ) -> YalResult<Value> {
        let mut current = params;
        while let Value::Pair(p) = current {
            if self.heap.car(p).as_symbol().is_none() {
                return Err(YalError::Malformed("lambda parameter list".into()));
            }
            current = self.heap.cdr(p);
        }
        if !matches!(current, Value::Nil | Value::Symbol(_)) {
            return Err(YalError::Malformed("lambda parameter list".into()));
        }
        let id = self.heap.alloc_closure(Closure {
            params,
            body,
            env,
            name,
        })?;
        Ok(Value::Closure(id))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
