//! Bytecode decoder and verifier
//!
//! Recursive descent over the tree-structured function body. The decoder
//! is the only component that advances the byte cursor; for every
//! accepted production it verifies structural and type correctness and
//! drives the graph builder in the same step. The first failure aborts
//! the decode with an offset-carrying diagnostic.
//!
//! Statements after a terminator (`return`, `break`, `continue`, an
//! infinite loop) are still verified, but no IR is built for them: the
//! decoder tracks a dead flag and expressions in dead code evaluate to
//! the shared placeholder node.

use crate::diagnostic::{DecodeError, ErrorCode};
use crate::env::FunctionEnv;
use tern_bytecode::{
    BytecodeReader, MachineFeatures, OpKind, Opcode, Support, ValueType,
};
use tern_graph::{Graph, GraphBuilder, NodeId};
use tracing::trace;

/// What kind of compound statement a control-stack frame belongs to
#[derive(Debug, Clone, Copy)]
enum BlockKind {
    Block,
    If,
    Switch,
    /// `Loop` and `While` frames; `continue` targets these. The header
    /// pair is absent when the frame was opened inside dead code.
    Loop {
        header: Option<(NodeId, NodeId)>,
    },
}

/// One frame on the decoder's control stack
#[derive(Debug)]
struct BlockContext {
    kind: BlockKind,
    /// Control/effect pairs of breaks targeting this frame
    exits: Vec<(NodeId, NodeId)>,
    /// Whether the frame was opened in live code
    live: bool,
}

/// Recursive-descent decoder for one function body
pub struct Decoder<'a> {
    env: &'a FunctionEnv<'a>,
    builder: GraphBuilder<'a>,
    reader: BytecodeReader<'a>,
    blocks: Vec<BlockContext>,
    dead: bool,
}

impl<'a> Decoder<'a> {
    /// Create a decoder over a `[start, end)` byte window
    pub fn new(
        env: &'a FunctionEnv<'a>,
        features: MachineFeatures,
        graph: &'a mut Graph,
        body: &'a [u8],
    ) -> Self {
        let builder = GraphBuilder::new(graph, features, env.module(), env.param_count());
        Self {
            env,
            builder,
            reader: BytecodeReader::new(body),
            blocks: Vec::new(),
            dead: false,
        }
    }

    /// Decode the whole body
    ///
    /// An empty body is a void return; a body whose control is still live
    /// at the end gets the same synthesized return of the zero constant.
    pub fn decode_function_body(&mut self) -> Result<(), DecodeError> {
        if !self.reader.has_more() {
            self.builder.ret(None);
            return Ok(());
        }
        while self.reader.has_more() {
            self.decode_stmt()?;
        }
        if !self.dead {
            self.builder.ret(None);
        }
        Ok(())
    }

    // ===== Cursor primitives =====

    fn read_opcode(&mut self, pc: usize) -> Result<Opcode, DecodeError> {
        let byte = self.reader.read_u8().map_err(|_| self.truncated(pc))?;
        let op = Opcode::from_u8(byte).ok_or_else(|| {
            DecodeError::new(
                ErrorCode::UnknownOpcode,
                pc,
                format!("unknown opcode {:#04x} @+{}", byte, pc),
            )
        })?;
        if self.builder.features().support(op) == Support::Unsupported {
            return Err(DecodeError::new(
                ErrorCode::UnsupportedOpcode,
                pc,
                format!("{} @+{}: not supported on this target", op.mnemonic(), pc),
            ));
        }
        trace!(op = op.mnemonic(), pc, "production");
        Ok(op)
    }

    fn imm_u8(&mut self, pc: usize) -> Result<u8, DecodeError> {
        self.reader.read_u8().map_err(|_| self.truncated(pc))
    }

    fn imm_i8(&mut self, pc: usize) -> Result<i8, DecodeError> {
        self.reader.read_i8().map_err(|_| self.truncated(pc))
    }

    fn imm_u32(&mut self, pc: usize) -> Result<u32, DecodeError> {
        self.reader.read_u32().map_err(|_| self.truncated(pc))
    }

    fn imm_i32(&mut self, pc: usize) -> Result<i32, DecodeError> {
        self.reader.read_i32().map_err(|_| self.truncated(pc))
    }

    fn imm_i64(&mut self, pc: usize) -> Result<i64, DecodeError> {
        self.reader.read_i64().map_err(|_| self.truncated(pc))
    }

    fn imm_f32(&mut self, pc: usize) -> Result<f32, DecodeError> {
        self.reader.read_f32().map_err(|_| self.truncated(pc))
    }

    fn imm_f64(&mut self, pc: usize) -> Result<f64, DecodeError> {
        self.reader.read_f64().map_err(|_| self.truncated(pc))
    }

    // ===== Diagnostics =====

    fn truncated(&self, pc: usize) -> DecodeError {
        DecodeError::new(
            ErrorCode::Truncated,
            pc,
            format!("bytecode truncated @+{} (production @+{})", self.reader.position(), pc),
        )
        .with_token(self.reader.position())
    }

    fn type_error(&self, pc: usize, op: Opcode, detail: String) -> DecodeError {
        DecodeError::new(
            ErrorCode::TypeError,
            pc,
            format!("{} @+{}: {}", op.mnemonic(), pc, detail),
        )
    }

    fn no_memory(&self, pc: usize, op: Opcode) -> DecodeError {
        DecodeError::new(
            ErrorCode::NoMemory,
            pc,
            format!("{} @+{}: no module environment attached", op.mnemonic(), pc),
        )
    }

    // ===== Control stitching =====

    /// Join `arms` (control/effect pairs) into a single continuation and
    /// point the cursors at it. Zero arms means nothing reaches here.
    fn stitch(&mut self, arms: Vec<(NodeId, NodeId)>) {
        match arms.len() {
            0 => {
                self.dead = true;
            }
            1 => {
                self.builder.set_control(arms[0].0);
                self.builder.set_effect(arms[0].1);
                self.dead = false;
            }
            _ => {
                let controls: Vec<NodeId> = arms.iter().map(|a| a.0).collect();
                let effects: Vec<NodeId> = arms.iter().map(|a| a.1).collect();
                let merge = self.builder.merge(&controls);
                let effect_phi = self.builder.effect_phi(&effects, merge);
                self.builder.set_control(merge);
                self.builder.set_effect(effect_phi);
                self.dead = false;
            }
        }
    }

    /// Close a block-like frame: its breaks plus (when live) the natural
    /// fall-through become the continuation.
    fn end_block(&mut self, ctx: BlockContext) {
        if !ctx.live {
            return;
        }
        let mut arms = ctx.exits;
        if !self.dead {
            arms.push((self.builder.control(), self.builder.effect()));
        }
        self.stitch(arms);
    }

    // ===== Statements =====

    fn decode_stmt(&mut self) -> Result<(), DecodeError> {
        let pc = self.reader.position();
        let op = self.read_opcode(pc)?;
        if op.kind() == OpKind::Expr {
            // Expression in statement position: evaluate, discard the value
            self.decode_expr_with(op, pc, None)?;
            return Ok(());
        }
        match op {
            Opcode::Nop => Ok(()),
            Opcode::Block => {
                let count = self.imm_u8(pc)?;
                self.decode_block(count)
            }
            Opcode::Loop => {
                let count = self.imm_u8(pc)?;
                self.decode_loop(count)
            }
            Opcode::If => self.decode_if(),
            Opcode::IfElse => self.decode_if_else(),
            Opcode::While => self.decode_while(),
            Opcode::Switch => {
                let count = self.imm_u8(pc)?;
                self.decode_switch(count, true)
            }
            Opcode::SwitchNf => {
                let count = self.imm_u8(pc)?;
                self.decode_switch(count, false)
            }
            Opcode::Break => self.decode_break(pc),
            Opcode::Continue => self.decode_continue(pc),
            Opcode::Return => self.decode_return(),
            Opcode::SetLocal => self.decode_set_local(pc),
            Opcode::StoreGlobal => self.decode_store_global(pc),
            _ => unreachable!("statement dispatch covers all statement opcodes"),
        }
    }

    fn decode_block(&mut self, count: u8) -> Result<(), DecodeError> {
        self.blocks.push(BlockContext {
            kind: BlockKind::Block,
            exits: Vec::new(),
            live: !self.dead,
        });
        for _ in 0..count {
            self.decode_stmt()?;
        }
        let ctx = self.blocks.pop().expect("block frame pushed above");
        self.end_block(ctx);
        Ok(())
    }

    fn decode_loop(&mut self, count: u8) -> Result<(), DecodeError> {
        let entry_live = !self.dead;
        let header = if entry_live {
            Some(self.builder.loop_header())
        } else {
            None
        };
        self.blocks.push(BlockContext {
            kind: BlockKind::Loop { header },
            exits: Vec::new(),
            live: entry_live,
        });
        for _ in 0..count {
            self.decode_stmt()?;
        }
        let ctx = self.blocks.pop().expect("loop frame pushed above");
        if !entry_live {
            return Ok(());
        }
        let (header, effect_phi) = header.expect("live loop has a header");
        let fell_through = !self.dead;
        if fell_through {
            let control = self.builder.control();
            let effect = self.builder.effect();
            self.builder.add_back_edge(header, effect_phi, control, effect);
        }
        if ctx.exits.is_empty() {
            // Only exit is an explicit break; without one the loop is
            // infinite and End observes it through a Terminate.
            if fell_through {
                self.builder.terminate(effect_phi, header);
            }
            self.dead = true;
        } else {
            self.dead = true;
            self.stitch(ctx.exits);
        }
        Ok(())
    }

    fn decode_while(&mut self) -> Result<(), DecodeError> {
        if self.dead {
            self.decode_expr(Some(ValueType::I32))?;
            self.blocks.push(BlockContext {
                kind: BlockKind::Loop { header: None },
                exits: Vec::new(),
                live: false,
            });
            self.decode_stmt()?;
            self.blocks.pop();
            return Ok(());
        }
        // loop { if !cond break; body; }
        let (header, effect_phi) = self.builder.loop_header();
        let (cond, _) = self.decode_expr(Some(ValueType::I32))?;
        let (taken, exit) = self.builder.branch(cond);
        let exit_effect = self.builder.effect();
        self.blocks.push(BlockContext {
            kind: BlockKind::Loop { header: Some((header, effect_phi)) },
            exits: vec![(exit, exit_effect)],
            live: true,
        });
        self.builder.set_control(taken);
        self.decode_stmt()?;
        let ctx = self.blocks.pop().expect("while frame pushed above");
        if !self.dead {
            let control = self.builder.control();
            let effect = self.builder.effect();
            self.builder.add_back_edge(header, effect_phi, control, effect);
        }
        self.dead = true;
        self.stitch(ctx.exits);
        Ok(())
    }

    fn decode_if(&mut self) -> Result<(), DecodeError> {
        if self.dead {
            self.decode_expr(Some(ValueType::I32))?;
            self.blocks.push(BlockContext {
                kind: BlockKind::If,
                exits: Vec::new(),
                live: false,
            });
            self.decode_stmt()?;
            self.blocks.pop();
            return Ok(());
        }
        let (cond, _) = self.decode_expr(Some(ValueType::I32))?;
        let (taken, not_taken) = self.builder.branch(cond);
        let pre_effect = self.builder.effect();
        self.blocks.push(BlockContext {
            kind: BlockKind::If,
            exits: Vec::new(),
            live: true,
        });
        self.builder.set_control(taken);
        self.decode_stmt()?;
        let ctx = self.blocks.pop().expect("if frame pushed above");
        let mut arms = ctx.exits;
        if !self.dead {
            arms.push((self.builder.control(), self.builder.effect()));
        }
        // The not-taken branch joins with the pre-if effect
        arms.push((not_taken, pre_effect));
        self.stitch(arms);
        Ok(())
    }

    fn decode_if_else(&mut self) -> Result<(), DecodeError> {
        if self.dead {
            self.decode_expr(Some(ValueType::I32))?;
            self.blocks.push(BlockContext {
                kind: BlockKind::If,
                exits: Vec::new(),
                live: false,
            });
            self.decode_stmt()?;
            self.decode_stmt()?;
            self.blocks.pop();
            return Ok(());
        }
        let (cond, _) = self.decode_expr(Some(ValueType::I32))?;
        let (taken, not_taken) = self.builder.branch(cond);
        let pre_effect = self.builder.effect();
        self.blocks.push(BlockContext {
            kind: BlockKind::If,
            exits: Vec::new(),
            live: true,
        });

        self.builder.set_control(taken);
        self.decode_stmt()?;
        let mut taken_end = None;
        if !self.dead {
            taken_end = Some((self.builder.control(), self.builder.effect()));
        }

        self.dead = false;
        self.builder.set_control(not_taken);
        self.builder.set_effect(pre_effect);
        self.decode_stmt()?;
        let mut arms = self.blocks.pop().expect("if frame pushed above").exits;
        if let Some(end) = taken_end {
            arms.push(end);
        }
        if !self.dead {
            arms.push((self.builder.control(), self.builder.effect()));
        }

        self.stitch(arms);
        Ok(())
    }

    fn decode_switch(&mut self, count: u8, fallthrough: bool) -> Result<(), DecodeError> {
        if self.dead {
            self.decode_expr(Some(ValueType::I32))?;
            self.blocks.push(BlockContext {
                kind: BlockKind::Switch,
                exits: Vec::new(),
                live: false,
            });
            for _ in 0..count {
                self.decode_stmt()?;
            }
            self.blocks.pop();
            return Ok(());
        }
        let (key, _) = self.decode_expr(Some(ValueType::I32))?;
        let switch = self.builder.switch(key, count as u32);
        let pre_effect = self.builder.effect();
        self.blocks.push(BlockContext {
            kind: BlockKind::Switch,
            exits: Vec::new(),
            live: true,
        });

        let mut fall: Option<(NodeId, NodeId)> = None;
        for i in 0..count {
            let entry = self.builder.if_value(switch, i as i32);
            match fall.take() {
                Some((fall_control, fall_effect)) if fallthrough => {
                    let merge = self.builder.merge(&[entry, fall_control]);
                    let effect_phi =
                        self.builder.effect_phi(&[pre_effect, fall_effect], merge);
                    self.builder.set_control(merge);
                    self.builder.set_effect(effect_phi);
                }
                _ => {
                    self.builder.set_control(entry);
                    self.builder.set_effect(pre_effect);
                }
            }
            self.dead = false;
            self.decode_stmt()?;
            if !self.dead {
                let case_end = (self.builder.control(), self.builder.effect());
                if fallthrough && i + 1 < count {
                    fall = Some(case_end);
                } else {
                    // Last case (or any case in the no-fallthrough form)
                    // falls through to the code after the switch.
                    self.blocks
                        .last_mut()
                        .expect("switch frame pushed above")
                        .exits
                        .push(case_end);
                }
            }
        }

        let mut ctx = self.blocks.pop().expect("switch frame pushed above");
        let default = self.builder.if_default(switch);
        ctx.exits.push((default, pre_effect));
        self.dead = true;
        self.stitch(ctx.exits);
        Ok(())
    }

    fn decode_break(&mut self, pc: usize) -> Result<(), DecodeError> {
        let depth = self.imm_u8(pc)?;
        if depth as usize >= self.blocks.len() {
            return Err(DecodeError::new(
                ErrorCode::BreakDepth,
                pc,
                format!(
                    "break @+{}: depth {} exceeds {} open blocks",
                    pc,
                    depth,
                    self.blocks.len()
                ),
            )
            .with_token(pc + 1));
        }
        if !self.dead {
            let target = self.blocks.len() - 1 - depth as usize;
            let arm = (self.builder.control(), self.builder.effect());
            self.blocks[target].exits.push(arm);
            self.dead = true;
        }
        Ok(())
    }

    fn decode_continue(&mut self, pc: usize) -> Result<(), DecodeError> {
        let depth = self.imm_u8(pc)?;
        if depth as usize >= self.blocks.len() {
            return Err(DecodeError::new(
                ErrorCode::BreakDepth,
                pc,
                format!(
                    "continue @+{}: depth {} exceeds {} open blocks",
                    pc,
                    depth,
                    self.blocks.len()
                ),
            )
            .with_token(pc + 1));
        }
        let target = self.blocks.len() - 1 - depth as usize;
        let kind = self.blocks[target].kind;
        let header = match kind {
            BlockKind::Loop { header } => header,
            _ => {
                return Err(DecodeError::new(
                    ErrorCode::BreakDepth,
                    pc,
                    format!("continue @+{}: target at depth {} is not a loop", pc, depth),
                )
                .with_token(pc + 1));
            }
        };
        if !self.dead {
            let (header, effect_phi) = header.expect("live continue targets a live loop");
            let control = self.builder.control();
            let effect = self.builder.effect();
            self.builder.add_back_edge(header, effect_phi, control, effect);
            self.dead = true;
        }
        Ok(())
    }

    fn decode_return(&mut self) -> Result<(), DecodeError> {
        let value = match self.env.sig().ret() {
            Some(ty) => Some(self.decode_expr(Some(ty))?.0),
            None => None,
        };
        if !self.dead {
            self.builder.ret(value);
        }
        self.dead = true;
        Ok(())
    }

    fn decode_set_local(&mut self, pc: usize) -> Result<(), DecodeError> {
        let index = self.imm_u8(pc)? as u16;
        let ty = self.env.local_type(index).ok_or_else(|| {
            DecodeError::new(
                ErrorCode::LocalIndexOutOfBounds,
                pc,
                format!(
                    "set_local @+{}: index {} exceeds {} locals",
                    pc,
                    index,
                    self.env.total_locals()
                ),
            )
            .with_token(pc + 1)
        })?;
        let (value, _) = self.decode_expr(Some(ty))?;
        if !self.dead {
            self.builder.store_local(index, value);
        }
        Ok(())
    }

    fn decode_store_global(&mut self, pc: usize) -> Result<(), DecodeError> {
        let index = self.imm_u8(pc)? as usize;
        let module = self
            .env
            .module()
            .ok_or_else(|| self.no_memory(pc, Opcode::StoreGlobal))?;
        let global = module.global(index).ok_or_else(|| {
            DecodeError::new(
                ErrorCode::GlobalIndexOutOfBounds,
                pc,
                format!(
                    "store_global @+{}: index {} exceeds {} globals",
                    pc,
                    index,
                    module.globals.len()
                ),
            )
            .with_token(pc + 1)
        })?;
        let ty = global.mem_type.value_type();
        let (value, _) = self.decode_expr(Some(ty))?;
        if !self.dead {
            self.builder.store_global(index, value);
        }
        Ok(())
    }

    // ===== Expressions =====

    fn decode_expr(
        &mut self,
        expected: Option<ValueType>,
    ) -> Result<(NodeId, ValueType), DecodeError> {
        let pc = self.reader.position();
        let op = self.read_opcode(pc)?;
        self.decode_expr_with(op, pc, expected)
    }

    fn decode_expr_with(
        &mut self,
        op: Opcode,
        pc: usize,
        expected: Option<ValueType>,
    ) -> Result<(NodeId, ValueType), DecodeError> {
        if op.kind() == OpKind::Stmt {
            return Err(self.type_error(
                pc,
                op,
                "statement opcode where a value was required".to_string(),
            ));
        }

        let (node, actual) = match op {
            Opcode::I8Const => {
                let value = self.imm_i8(pc)? as i32;
                (self.const_node(|b| b.int32_constant(value)), ValueType::I32)
            }
            Opcode::I32Const => {
                let value = self.imm_i32(pc)?;
                (self.const_node(|b| b.int32_constant(value)), ValueType::I32)
            }
            Opcode::I64Const => {
                let value = self.imm_i64(pc)?;
                (self.const_node(|b| b.int64_constant(value)), ValueType::I64)
            }
            Opcode::F32Const => {
                let value = self.imm_f32(pc)?;
                (self.const_node(|b| b.float32_constant(value)), ValueType::F32)
            }
            Opcode::F64Const => {
                let value = self.imm_f64(pc)?;
                (self.const_node(|b| b.float64_constant(value)), ValueType::F64)
            }
            Opcode::GetLocal => {
                let index = self.imm_u8(pc)? as u16;
                let ty = self.env.local_type(index).ok_or_else(|| {
                    DecodeError::new(
                        ErrorCode::LocalIndexOutOfBounds,
                        pc,
                        format!(
                            "get_local @+{}: index {} exceeds {} locals",
                            pc,
                            index,
                            self.env.total_locals()
                        ),
                    )
                    .with_token(pc + 1)
                })?;
                let node = if self.dead {
                    self.builder.dead_node()
                } else {
                    self.builder.load_local(index)
                };
                (node, ty)
            }
            Opcode::LoadGlobal => {
                let index = self.imm_u8(pc)? as usize;
                let module = self
                    .env
                    .module()
                    .ok_or_else(|| self.no_memory(pc, op))?;
                let global = module.global(index).ok_or_else(|| {
                    DecodeError::new(
                        ErrorCode::GlobalIndexOutOfBounds,
                        pc,
                        format!(
                            "load_global @+{}: index {} exceeds {} globals",
                            pc,
                            index,
                            module.globals.len()
                        ),
                    )
                    .with_token(pc + 1)
                })?;
                let ty = global.mem_type.value_type();
                let node = if self.dead {
                    self.builder.dead_node()
                } else {
                    self.builder.load_global(index)
                };
                (node, ty)
            }
            Opcode::Ternary => self.decode_ternary(pc, expected)?,
            Opcode::Comma => {
                self.decode_expr(None)?;
                self.decode_expr(expected)?
            }
            Opcode::BoolNot => {
                let (input, _) = self.decode_expr(Some(ValueType::I32))?;
                let node = if self.dead {
                    self.builder.dead_node()
                } else {
                    self.builder.unop(op, input)
                };
                (node, ValueType::I32)
            }
            Opcode::CallFunction => self.decode_call_function(pc)?,
            Opcode::CallIndirect => self.decode_call_indirect(pc)?,
            _ if op.is_load() => {
                let offset = self.imm_u32(pc)?;
                if self.env.module().is_none() {
                    return Err(self.no_memory(pc, op));
                }
                let (index, _) = self.decode_expr(Some(ValueType::I32))?;
                let node = if self.dead {
                    self.builder.dead_node()
                } else {
                    self.builder.load_mem(op, offset, index)
                };
                let ty = op.sig().map(|s| s.ret).unwrap_or(ValueType::Stmt);
                (node, ty)
            }
            _ if op.is_store() => {
                let offset = self.imm_u32(pc)?;
                if self.env.module().is_none() {
                    return Err(self.no_memory(pc, op));
                }
                let sig = op.sig().expect("store opcodes carry signatures");
                let (index, _) = self.decode_expr(Some(sig.params[0]))?;
                let (value, _) = self.decode_expr(Some(sig.params[1]))?;
                let node = if self.dead {
                    self.builder.dead_node()
                } else {
                    self.builder.store_mem(op, offset, index, value)
                };
                (node, sig.ret)
            }
            _ => {
                // Fixed-signature operators
                let sig = op.sig().ok_or_else(|| {
                    DecodeError::new(
                        ErrorCode::InternalError,
                        pc,
                        format!("{} @+{}: opcode missing from signature table", op.mnemonic(), pc),
                    )
                })?;
                match sig.params.len() {
                    1 => {
                        let (input, _) = self.decode_expr(Some(sig.params[0]))?;
                        let node = if self.dead {
                            self.builder.dead_node()
                        } else {
                            self.builder.unop(op, input)
                        };
                        (node, sig.ret)
                    }
                    2 => {
                        let (left, _) = self.decode_expr(Some(sig.params[0]))?;
                        let (right, _) = self.decode_expr(Some(sig.params[1]))?;
                        let node = if self.dead {
                            self.builder.dead_node()
                        } else {
                            self.builder.binop(op, left, right)
                        };
                        (node, sig.ret)
                    }
                    _ => {
                        return Err(DecodeError::new(
                            ErrorCode::InternalError,
                            pc,
                            format!(
                                "{} @+{}: unexpected arity {} in signature table",
                                op.mnemonic(),
                                pc,
                                sig.params.len()
                            ),
                        ));
                    }
                }
            }
        };

        if let Some(expected) = expected {
            if actual != expected {
                return Err(self.type_error(
                    pc,
                    op,
                    format!("expected {}, found {}", expected, actual),
                ));
            }
        }
        Ok((node, actual))
    }

    fn const_node(&mut self, make: impl FnOnce(&mut GraphBuilder<'a>) -> NodeId) -> NodeId {
        if self.dead {
            self.builder.dead_node()
        } else {
            make(&mut self.builder)
        }
    }

    fn decode_ternary(
        &mut self,
        pc: usize,
        expected: Option<ValueType>,
    ) -> Result<(NodeId, ValueType), DecodeError> {
        let (cond, _) = self.decode_expr(Some(ValueType::I32))?;
        if self.dead {
            let (_, ty) = self.decode_expr(expected)?;
            if !ty.is_value() {
                return Err(self.type_error(pc, Opcode::Ternary, format!("arms must produce a value, found {}", ty)));
            }
            self.decode_expr(Some(ty))?;
            return Ok((self.builder.dead_node(), ty));
        }
        let (taken, not_taken) = self.builder.branch(cond);
        let pre_effect = self.builder.effect();

        self.builder.set_control(taken);
        let (then_value, ty) = self.decode_expr(expected)?;
        if !ty.is_value() {
            return Err(self.type_error(pc, Opcode::Ternary, format!("arms must produce a value, found {}", ty)));
        }
        let then_end = (self.builder.control(), self.builder.effect());

        self.builder.set_control(not_taken);
        self.builder.set_effect(pre_effect);
        let (else_value, _) = self.decode_expr(Some(ty))?;
        let else_end = (self.builder.control(), self.builder.effect());

        let merge = self.builder.merge(&[then_end.0, else_end.0]);
        let effect_phi = self.builder.effect_phi(&[then_end.1, else_end.1], merge);
        let phi = self.builder.phi(ty, &[then_value, else_value], merge);
        self.builder.set_control(merge);
        self.builder.set_effect(effect_phi);
        Ok((phi, ty))
    }

    fn decode_call_function(&mut self, pc: usize) -> Result<(NodeId, ValueType), DecodeError> {
        let index = self.imm_u8(pc)? as usize;
        let module = self
            .env
            .module()
            .ok_or_else(|| self.no_memory(pc, Opcode::CallFunction))?;
        let (sig, code) = match (module.signature_of(index), module.code_of(index)) {
            (Some(sig), Some(code)) => (sig.clone(), code),
            _ => {
                return Err(DecodeError::new(
                    ErrorCode::FunctionIndexOutOfBounds,
                    pc,
                    format!(
                        "call_function @+{}: index {} exceeds {} functions",
                        pc,
                        index,
                        module.functions.len()
                    ),
                )
                .with_token(pc + 1));
            }
        };
        let mark = self.builder.args_mark();
        for &param in sig.params() {
            let (value, _) = self.decode_expr(Some(param))?;
            self.builder.push_arg(value);
        }
        let node = if self.dead {
            self.builder.truncate_args(mark);
            self.builder.dead_node()
        } else {
            self.builder.call_direct(&sig, code, mark)
        };
        Ok((node, sig.ret().unwrap_or(ValueType::Stmt)))
    }

    fn decode_call_indirect(&mut self, pc: usize) -> Result<(NodeId, ValueType), DecodeError> {
        let sig_index = self.imm_u8(pc)? as usize;
        let module = self
            .env
            .module()
            .ok_or_else(|| self.no_memory(pc, Opcode::CallIndirect))?;
        let sig = module
            .signature_of_table_slot(sig_index)
            .ok_or_else(|| {
                DecodeError::new(
                    ErrorCode::ArityMismatch,
                    pc,
                    format!(
                        "call_indirect @+{}: signature index {} exceeds {} signatures",
                        pc,
                        sig_index,
                        module.signatures.len()
                    ),
                )
                .with_token(pc + 1)
            })?
            .clone();
        let (key, _) = self.decode_expr(Some(ValueType::I32))?;
        let mark = self.builder.args_mark();
        for &param in sig.params() {
            let (value, _) = self.decode_expr(Some(param))?;
            self.builder.push_arg(value);
        }
        let node = if self.dead {
            self.builder.truncate_args(mark);
            self.builder.dead_node()
        } else {
            self.builder
                .call_indirect(sig_index as u32, &sig, key, mark)
        };
        Ok((node, sig.ret().unwrap_or(ValueType::Stmt)))
    }
}
