/*
 * interp.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tree-walking interpreter.
//!
//! Evaluation is a single pass over the statement list. Builtin calls
//! are dispatched through [`HostBuiltins`], which the embedding engine
//! implements; the interpreter itself performs no I/O.

use crate::ast::{AssignOp, BinOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use crate::env::Env;
use crate::error::{ScriptError, ScriptResult};
use crate::value::Value;

/// Maximum function-call nesting before a fault is raised.
pub const MAX_CALL_DEPTH: usize = 256;

/// Builtin dispatch implemented by the embedding host.
///
/// The error message is wrapped into a [`ScriptError::Host`] carrying
/// the call site's line; hosts that need richer fault data keep it on
/// their side and match it up afterwards.
pub trait HostBuiltins {
    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Value, String>;
}

/// A host with no builtins; every builtin call faults.
pub struct NoBuiltins;

impl HostBuiltins for NoBuiltins {
    fn call_builtin(&mut self, name: &str, _args: Vec<Value>) -> Result<Value, String> {
        Err(format!("unknown builtin '{name}'"))
    }
}

/// Run a parsed program.
///
/// `globals` is the shared scope: builtins and cross-file variables
/// live there. Each run gets a fresh frame on top of it, so `var`
/// declarations stay local to the program being run while undeclared
/// assignments fall through to the shared scope.
pub fn run(program: &Program, globals: &Env, host: &mut dyn HostBuiltins) -> ScriptResult<()> {
    let mut interp = Interp {
        globals: globals.clone(),
        host,
        line: 1,
        depth: 0,
    };
    let frame = globals.child();
    for stmt in &program.stmts {
        match interp.exec_stmt(stmt, &frame)? {
            Flow::Normal => {}
            Flow::Break | Flow::Continue => {
                return Err(interp.error("'break' or 'continue' outside of a loop"));
            }
            Flow::Return(_) => return Err(interp.error("'return' outside of a function")),
        }
    }
    Ok(())
}

/// Non-local control flow signalled up the statement walk.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Interp<'h> {
    globals: Env,
    host: &'h mut dyn HostBuiltins,
    /// Line of the statement currently executing.
    line: usize,
    /// Current function-call depth.
    depth: usize,
}

impl Interp<'_> {
    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Runtime {
            message: message.into(),
            line: self.line,
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> ScriptResult<Flow> {
        self.line = stmt.line();
        match stmt {
            Stmt::Var { decls, .. } => {
                for (name, init) in decls {
                    let value = match init {
                        Some(expr) => self.eval(expr, env)?,
                        None => Value::Null,
                    };
                    env.declare(name.clone(), value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr { expr, .. } => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval(cond, env)?.is_truthy() {
                    self.exec_stmt(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body, .. } => {
                loop {
                    self.line = stmt.line();
                    if !self.eval(cond, env)?.is_truthy() {
                        break;
                    }
                    match self.exec_stmt(body, env)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                let loop_env = env.child();
                if let Some(init) = init {
                    self.exec_stmt(init, &loop_env)?;
                }
                loop {
                    self.line = stmt.line();
                    if let Some(cond) = cond {
                        if !self.eval(cond, &loop_env)?.is_truthy() {
                            break;
                        }
                    }
                    match self.exec_stmt(body, &loop_env)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    if let Some(step) = step {
                        self.eval(step, &loop_env)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::FunctionDecl {
                name, params, body, ..
            } => {
                env.declare(
                    name.clone(),
                    Value::function(
                        Some(name.clone()),
                        params.clone(),
                        body.clone(),
                        env.clone(),
                    ),
                );
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
            Stmt::Block { stmts, .. } => {
                let block_env = env.child();
                for stmt in stmts {
                    match self.exec_stmt(stmt, &block_env)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
        }
    }

    fn eval(&mut self, expr: &Expr, env: &Env) -> ScriptResult<Value> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Ident(name) => env
                .get(name)
                .ok_or_else(|| self.error(format!("'{name}' is not defined"))),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, env)?);
                }
                Ok(Value::list(values))
            }
            Expr::MapLit(entries) => {
                let mut map = std::collections::BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value, env)?);
                }
                Ok(Value::map(map))
            }
            Expr::Function { name, params, body } => Ok(Value::function(
                name.clone(),
                params.clone(),
                body.clone(),
                env.clone(),
            )),
            Expr::Unary { op, operand } => self.eval_unary(*op, operand, env),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                self.eval_binary(*op, lhs, rhs)
            }
            Expr::Logical { op, lhs, rhs } => {
                let lhs = self.eval(lhs, env)?;
                match op {
                    LogicalOp::And => {
                        if lhs.is_truthy() {
                            self.eval(rhs, env)
                        } else {
                            Ok(lhs)
                        }
                    }
                    LogicalOp::Or => {
                        if lhs.is_truthy() {
                            Ok(lhs)
                        } else {
                            self.eval(rhs, env)
                        }
                    }
                }
            }
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, env)?.is_truthy() {
                    self.eval(then_branch, env)
                } else {
                    self.eval(else_branch, env)
                }
            }
            Expr::Assign { target, op, value } => self.eval_assign(target, *op, value, env),
            Expr::Call { callee, args } => {
                let callee = self.eval(callee, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                self.call(callee, values)
            }
            Expr::Member { object, field } => {
                let object = self.eval(object, env)?;
                self.member_get(&object, field)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                self.index_get(&object, &index)
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, env: &Env) -> ScriptResult<Value> {
        if op == UnaryOp::TypeOf {
            // `typeof unbound` answers 'undefined' instead of faulting,
            // so directives can probe the scope before defining.
            if let Expr::Ident(name) = operand {
                return Ok(match env.get(name) {
                    Some(value) => Value::Str(value.type_name().to_string()),
                    None => Value::Str("undefined".to_string()),
                });
            }
            let value = self.eval(operand, env)?;
            return Ok(Value::Str(value.type_name().to_string()));
        }
        let value = self.eval(operand, env)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
            UnaryOp::Neg => match value {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(self.error(format!("cannot negate a {}", other.type_name()))),
            },
            UnaryOp::Plus => match value {
                Value::Number(n) => Ok(Value::Number(n)),
                other => Err(self.error(format!(
                    "unary '+' expects a number, found {}",
                    other.type_name()
                ))),
            },
            UnaryOp::TypeOf => unreachable!(),
        }
    }

    fn eval_binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> ScriptResult<Value> {
        match op {
            BinOp::Add => match (&lhs, &rhs) {
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    Ok(Value::Str(format!("{}{}", lhs.to_text(), rhs.to_text())))
                }
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                _ => Err(self.error(format!(
                    "cannot add {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                ))),
            },
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let (a, b) = self.numeric_operands(op, &lhs, &rhs)?;
                Ok(Value::Number(match op {
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Mod => a % b,
                    _ => unreachable!(),
                }))
            }
            BinOp::Eq => Ok(Value::Bool(lhs.equals(&rhs))),
            BinOp::Ne => Ok(Value::Bool(!lhs.equals(&rhs))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = match (&lhs, &rhs) {
                    (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                    (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                    _ => {
                        return Err(self.error(format!(
                            "cannot compare {} with {}",
                            lhs.type_name(),
                            rhs.type_name()
                        )));
                    }
                };
                let result = match ordering {
                    None => false, // NaN comparisons
                    Some(ordering) => match op {
                        BinOp::Lt => ordering.is_lt(),
                        BinOp::Le => ordering.is_le(),
                        BinOp::Gt => ordering.is_gt(),
                        BinOp::Ge => ordering.is_ge(),
                        _ => unreachable!(),
                    },
                };
                Ok(Value::Bool(result))
            }
        }
    }

    fn numeric_operands(&self, op: BinOp, lhs: &Value, rhs: &Value) -> ScriptResult<(f64, f64)> {
        match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
            _ => Err(self.error(format!(
                "operator {op:?} expects numbers, found {} and {}",
                lhs.type_name(),
                rhs.type_name()
            ))),
        }
    }

    fn eval_assign(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        env: &Env,
    ) -> ScriptResult<Value> {
        let new_value = match op {
            AssignOp::Set => self.eval(value, env)?,
            AssignOp::Add | AssignOp::Sub => {
                let current = self.eval(target, env)?;
                let rhs = self.eval(value, env)?;
                let bin_op = if op == AssignOp::Add {
                    BinOp::Add
                } else {
                    BinOp::Sub
                };
                self.eval_binary(bin_op, current, rhs)?
            }
        };
        match target {
            Expr::Ident(name) => {
                // Unbound names land in the shared scope, making
                // `FLAG = true` visible to later includes.
                if !env.assign(name, new_value.clone()) {
                    self.globals.declare(name.clone(), new_value.clone());
                }
                Ok(new_value)
            }
            Expr::Member { object, field } => {
                let object = self.eval(object, env)?;
                match object {
                    Value::Map(entries) => {
                        entries
                            .borrow_mut()
                            .insert(field.clone(), new_value.clone());
                        Ok(new_value)
                    }
                    other => Err(self.error(format!(
                        "cannot set field '{field}' on a {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                match (&object, &index) {
                    (Value::List(items), Value::Number(n)) => {
                        let idx = self.list_index(*n)?;
                        let mut items = items.borrow_mut();
                        if idx < items.len() {
                            items[idx] = new_value.clone();
                        } else if idx == items.len() {
                            items.push(new_value.clone());
                        } else {
                            return Err(self.error(format!(
                                "list index {idx} out of bounds (len {})",
                                items.len()
                            )));
                        }
                        Ok(new_value)
                    }
                    (Value::Map(entries), Value::Str(key)) => {
                        entries.borrow_mut().insert(key.clone(), new_value.clone());
                        Ok(new_value)
                    }
                    _ => Err(self.error(format!(
                        "cannot index a {} with a {}",
                        object.type_name(),
                        index.type_name()
                    ))),
                }
            }
            _ => Err(self.error("invalid assignment target")),
        }
    }

    fn member_get(&self, object: &Value, field: &str) -> ScriptResult<Value> {
        match object {
            Value::Map(entries) => Ok(entries.borrow().get(field).cloned().unwrap_or(Value::Null)),
            Value::Str(s) if field == "length" => Ok(Value::Number(s.chars().count() as f64)),
            Value::List(items) if field == "length" => {
                Ok(Value::Number(items.borrow().len() as f64))
            }
            other => Err(self.error(format!(
                "no property '{field}' on a {}",
                other.type_name()
            ))),
        }
    }

    fn index_get(&self, object: &Value, index: &Value) -> ScriptResult<Value> {
        match (object, index) {
            (Value::List(items), Value::Number(n)) => {
                let idx = self.list_index(*n)?;
                Ok(items.borrow().get(idx).cloned().unwrap_or(Value::Null))
            }
            (Value::Map(entries), Value::Str(key)) => {
                Ok(entries.borrow().get(key).cloned().unwrap_or(Value::Null))
            }
            _ => Err(self.error(format!(
                "cannot index a {} with a {}",
                object.type_name(),
                index.type_name()
            ))),
        }
    }

    fn list_index(&self, n: f64) -> ScriptResult<usize> {
        if n.fract() != 0.0 || n < 0.0 || !n.is_finite() {
            return Err(self.error(format!("invalid list index {n}")));
        }
        Ok(n as usize)
    }

    fn call(&mut self, callee: Value, args: Vec<Value>) -> ScriptResult<Value> {
        match callee {
            Value::Builtin(name) => {
                let line = self.line;
                self.host
                    .call_builtin(name, args)
                    .map_err(|message| ScriptError::Host { message, line })
            }
            Value::Function(function) => {
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(self.error("maximum call depth exceeded"));
                }
                let call_env = function.env.child();
                for (i, param) in function.params.iter().enumerate() {
                    call_env.declare(param.clone(), args.get(i).cloned().unwrap_or(Value::Null));
                }
                self.depth += 1;
                let saved_line = self.line;
                let mut result = Value::Null;
                for stmt in function.body.iter() {
                    match self.exec_stmt(stmt, &call_env) {
                        Ok(Flow::Normal) => {}
                        Ok(Flow::Return(value)) => {
                            result = value;
                            break;
                        }
                        Ok(Flow::Break | Flow::Continue) => {
                            self.depth -= 1;
                            self.line = saved_line;
                            return Err(self.error("'break' or 'continue' outside of a loop"));
                        }
                        Err(err) => {
                            self.depth -= 1;
                            self.line = saved_line;
                            return Err(err);
                        }
                    }
                }
                self.depth -= 1;
                self.line = saved_line;
                Ok(result)
            }
            other => Err(self.error(format!("a {} is not callable", other.type_name()))),
        }
    }
}
