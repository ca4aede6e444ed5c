//! Rough estimate of how much code a `finally` block expands to
//!
//! Each copy of an inlined finalizer costs its full size, so large finalizers are better off as
//! subroutines where the class file version still allows `jsr`. The weights are per node kind.
//! Scanning stops as soon as the estimate passes the limit, since only the comparison matters.

use crate::tree::{Expr, ExprKind, Receiver, Stmt, StmtKind};

/// Estimated complexity of a statement, saturating a little past `limit`
pub fn complexity(stmt: &Stmt, limit: usize) -> usize {
    let mut scanner = Scanner {
        complexity: 0,
        limit,
    };
    scanner.stmt(stmt);
    scanner.complexity
}

struct Scanner {
    complexity: usize,
    limit: usize,
}

impl Scanner {
    fn done(&self) -> bool {
        self.limit > 0 && self.complexity > self.limit
    }

    fn stmt(&mut self, stmt: &Stmt) {
        if self.done() {
            return;
        }
        match &stmt.kind {
            StmtKind::Empty => (),
            StmtKind::Block { stmts } => stmts.iter().for_each(|stmt| self.stmt(stmt)),
            StmtKind::LocalVar { init, .. } => {
                if let Some(init) = init {
                    self.expr(init);
                }
            }
            StmtKind::Expr { expr } => self.expr(expr),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond);
                self.stmt(then);
                if let Some(otherwise) = otherwise {
                    self.stmt(otherwise);
                }
                self.complexity += 2;
            }
            StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
                self.expr(cond);
                self.stmt(body);
                self.complexity += 1;
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                init.iter().for_each(|stmt| self.stmt(stmt));
                if let Some(cond) = cond {
                    self.expr(cond);
                }
                update.iter().for_each(|expr| self.expr(expr));
                self.stmt(body);
                self.complexity += 1;
            }
            StmtKind::Labelled { body, .. } => self.stmt(body),
            StmtKind::Switch { selector, cases } => {
                self.expr(selector);
                for case in cases {
                    case.body.iter().for_each(|stmt| self.stmt(stmt));
                    self.complexity += 1;
                }
                self.complexity += 5;
            }
            StmtKind::Break { .. } | StmtKind::Continue { .. } => self.complexity += 1,
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.expr(value);
                }
                self.complexity += 1;
            }
            StmtKind::Throw { value } => {
                self.expr(value);
                self.complexity += 1;
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                self.stmt(body);
                for catch in catches {
                    self.stmt(&catch.body);
                    self.complexity += 2;
                }
                if let Some(finally) = finally {
                    self.stmt(finally);
                    self.complexity += 6;
                }
            }
            StmtKind::Synchronized { lock, body } => {
                self.expr(lock);
                self.stmt(body);
                self.complexity += 6;
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        if self.done() {
            return;
        }
        if expr.constant.is_some() {
            self.complexity += 1;
            return;
        }
        match &expr.kind {
            ExprKind::Literal { .. } | ExprKind::Null | ExprKind::This => self.complexity += 1,
            ExprKind::Local { .. } => self.complexity += 1,
            ExprKind::ClassLiteral { .. } => self.complexity += 1,
            ExprKind::Field { receiver, .. } => {
                self.receiver(receiver);
                self.complexity += 1;
            }
            ExprKind::Invoke { receiver, args, .. } => {
                self.receiver(receiver);
                args.iter().for_each(|arg| self.expr(arg));
                self.complexity += 2;
            }
            ExprKind::New { args, .. } => {
                args.iter().for_each(|arg| self.expr(arg));
                self.complexity += 2;
            }
            ExprKind::NewArray { dims, elems } => {
                dims.iter().for_each(|dim| self.expr(dim));
                elems.iter().flatten().for_each(|elem| self.expr(elem));
                self.complexity += 5;
            }
            ExprKind::ArrayLength { array } => {
                self.expr(array);
                self.complexity += 1;
            }
            ExprKind::Index { array, index } => {
                self.expr(array);
                self.expr(index);
                self.complexity += 1;
            }
            ExprKind::Assign { target, value } => {
                self.expr(target);
                self.expr(value);
                self.complexity += 1;
            }
            ExprKind::CompoundAssign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
                self.complexity += 2;
            }
            ExprKind::Unary { operand, .. } => {
                self.expr(operand);
                self.complexity += 1;
                if operand.constant.is_none() {
                    self.complexity += 1;
                }
            }
            ExprKind::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
                self.complexity += 1;
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond);
                self.expr(then);
                self.expr(otherwise);
                self.complexity += 2;
            }
            ExprKind::Cast { expr } => self.expr(expr),
            ExprKind::InstanceOf { expr, .. } => {
                self.expr(expr);
                self.complexity += 1;
            }
        }
    }

    fn receiver(&mut self, receiver: &Receiver) {
        if let Receiver::Expr(expr) = receiver {
            self.expr(expr);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{BinaryName, FieldType};
    use crate::tree::{BinaryOp, VarId};

    fn increment(var: u32) -> Stmt {
        let local = Expr::local(VarId(var), FieldType::int());
        let sum = Expr::binary(BinaryOp::Add, FieldType::int(), local.clone(), Expr::int(1));
        Stmt::new(StmtKind::Expr {
            expr: Expr::new(
                Some(FieldType::int()),
                ExprKind::Assign {
                    target: Box::new(local),
                    value: Box::new(sum),
                },
            ),
        })
    }

    #[test]
    fn weights_add_up() {
        // assignment (1) + local (1) + binary (1) + local (1) + literal (1)
        assert_eq!(complexity(&increment(0), 0), 5);

        let guarded = Stmt::new(StmtKind::If {
            cond: Expr::local(VarId(1), FieldType::boolean()),
            then: Box::new(increment(0)),
            otherwise: None,
        });
        assert_eq!(complexity(&guarded, 0), 8);

        let thrown = Stmt::new(StmtKind::Throw {
            value: Expr::new(
                Some(FieldType::object(BinaryName::RUNTIMEEXCEPTION)),
                ExprKind::New {
                    constructor: crate::jvm::MethodRef::constructor(BinaryName::RUNTIMEEXCEPTION, vec![]),
                    args: vec![],
                },
            ),
        });
        assert_eq!(complexity(&thrown, 0), 3);
    }

    #[test]
    fn stops_past_the_limit() {
        let block = Stmt::new(StmtKind::Block {
            stmts: (0..100).map(increment).collect(),
        });
        assert_eq!(complexity(&block, 0), 500);
        let capped = complexity(&block, 12);
        assert!(capped > 12 && capped <= 17);
    }
}
