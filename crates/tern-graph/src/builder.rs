//! Graph builder
//!
//! Constructs IR nodes while the decoder walks the bytecode tree. The
//! builder owns the two live cursors (current control node, current effect
//! node) and a scratch argument buffer for call construction. Operator
//! selection for `binop`/`unop` dispatches on target capabilities: opcodes
//! without a native machine operator are expanded here into equivalent
//! primitive-op graphs, and runtime-unsafe operations get trap checks
//! routed into the shared trap blocks.

use crate::graph::{Graph, NodeId};
use crate::operator::{Binop, Operator, TrapReason, Unop};
use crate::trap::TrapHelper;
use tern_bytecode::{
    CodeRef, FuncSig, MachineFeatures, MemType, ModuleEnv, Opcode, PointerWidth, ValueType,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum IntWidth {
    W32,
    W64,
}

/// Builder for one function graph
pub struct GraphBuilder<'a> {
    graph: &'a mut Graph,
    features: MachineFeatures,
    module: Option<&'a ModuleEnv>,
    trap: TrapHelper,
    control: NodeId,
    effect: NodeId,
    args: Vec<NodeId>,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder over an empty graph
    ///
    /// Creates the Start node (the initial effect and control) and the End
    /// node that collects terminators.
    pub fn new(
        graph: &'a mut Graph,
        features: MachineFeatures,
        module: Option<&'a ModuleEnv>,
        param_count: u16,
    ) -> Self {
        let start = graph.new_node(Operator::Start { param_count }, Vec::new());
        graph.set_start(start);
        let end = graph.new_node(Operator::End, Vec::new());
        graph.set_end(end);
        let trap = TrapHelper::new(module.and_then(|m| m.context));
        Self {
            graph,
            features,
            module,
            trap,
            control: start,
            effect: start,
            args: Vec::new(),
        }
    }

    /// The current control cursor
    pub fn control(&self) -> NodeId {
        self.control
    }

    /// The current effect cursor
    pub fn effect(&self) -> NodeId {
        self.effect
    }

    /// Move the control cursor
    pub fn set_control(&mut self, control: NodeId) {
        self.control = control;
    }

    /// Move the effect cursor
    pub fn set_effect(&mut self, effect: NodeId) {
        self.effect = effect;
    }

    /// The target description this builder compiles for
    pub fn features(&self) -> &MachineFeatures {
        &self.features
    }

    /// The shared placeholder for values in unreachable code
    pub fn dead_node(&mut self) -> NodeId {
        self.graph.dead_node()
    }

    // ===== Scratch argument buffer =====

    /// Mark the current argument-buffer depth; pass the mark to the call
    /// constructors so nested calls compose.
    pub fn args_mark(&self) -> usize {
        self.args.len()
    }

    /// Push one decoded argument
    pub fn push_arg(&mut self, value: NodeId) {
        self.args.push(value);
    }

    /// Drop arguments pushed since `mark` without emitting a call
    pub fn truncate_args(&mut self, mark: usize) {
        self.args.truncate(mark);
    }

    // ===== Constants =====

    /// i32 constant node
    pub fn int32_constant(&mut self, value: i32) -> NodeId {
        self.graph.new_node(Operator::Int32Constant(value), Vec::new())
    }

    /// i64 constant node
    pub fn int64_constant(&mut self, value: i64) -> NodeId {
        self.graph.new_node(Operator::Int64Constant(value), Vec::new())
    }

    /// f32 constant node
    pub fn float32_constant(&mut self, value: f32) -> NodeId {
        self.graph.new_node(Operator::Float32Constant(value), Vec::new())
    }

    /// f64 constant node
    pub fn float64_constant(&mut self, value: f64) -> NodeId {
        self.graph.new_node(Operator::Float64Constant(value), Vec::new())
    }

    /// Pointer-sized address constant node
    pub fn intptr_constant(&mut self, value: u64) -> NodeId {
        self.graph.new_node(Operator::IntPtrConstant(value), Vec::new())
    }

    fn int_constant(&mut self, width: IntWidth, value: i64) -> NodeId {
        match width {
            IntWidth::W32 => self.int32_constant(value as i32),
            IntWidth::W64 => self.int64_constant(value),
        }
    }

    fn mach_binop(&mut self, op: Binop, left: NodeId, right: NodeId) -> NodeId {
        self.graph.new_node(Operator::Binop(op), vec![left, right])
    }

    fn mach_unop(&mut self, op: Unop, input: NodeId) -> NodeId {
        self.graph.new_node(Operator::Unop(op), vec![input])
    }

    // ===== Trap checks =====

    /// Branch at the current control; one side joins the shared trap block
    /// for `reason`, the other becomes the new current control. The effect
    /// cursor is left at the pre-branch effect.
    pub fn trap_if(&mut self, reason: TrapReason, cond: NodeId, iftrue_means_trap: bool) {
        let (if_true, if_false) = self.branch(cond);
        let (trap_arm, continue_arm) = if iftrue_means_trap {
            (if_true, if_false)
        } else {
            (if_false, if_true)
        };
        self.trap
            .add_trap_site(self.graph, reason, trap_arm, self.effect);
        self.control = continue_arm;
    }

    // ===== Binop / Unop dispatch =====

    /// Build a two-operand expression opcode
    pub fn binop(&mut self, op: Opcode, left: NodeId, right: NodeId) -> NodeId {
        use Opcode as Op;
        match op {
            Op::I32Add => self.mach_binop(Binop::I32Add, left, right),
            Op::I32Sub => self.mach_binop(Binop::I32Sub, left, right),
            Op::I32Mul => self.mach_binop(Binop::I32Mul, left, right),
            Op::I32And => self.mach_binop(Binop::I32And, left, right),
            Op::I32Or => self.mach_binop(Binop::I32Or, left, right),
            Op::I32Xor => self.mach_binop(Binop::I32Xor, left, right),
            Op::I32Shl => self.mach_binop(Binop::I32Shl, left, right),
            Op::I32ShrU => self.mach_binop(Binop::I32ShrU, left, right),
            Op::I32ShrS => self.mach_binop(Binop::I32ShrS, left, right),
            Op::I32Eq => self.mach_binop(Binop::I32Eq, left, right),
            Op::I32Ne => self.mach_binop(Binop::I32Ne, left, right),
            Op::I32LtS => self.mach_binop(Binop::I32LtS, left, right),
            Op::I32LeS => self.mach_binop(Binop::I32LeS, left, right),
            Op::I32LtU => self.mach_binop(Binop::I32LtU, left, right),
            Op::I32LeU => self.mach_binop(Binop::I32LeU, left, right),
            // Gt/Ge are the swapped Lt/Le
            Op::I32GtS => self.mach_binop(Binop::I32LtS, right, left),
            Op::I32GeS => self.mach_binop(Binop::I32LeS, right, left),
            Op::I32GtU => self.mach_binop(Binop::I32LtU, right, left),
            Op::I32GeU => self.mach_binop(Binop::I32LeU, right, left),
            Op::I32DivS => self.int_div_s(IntWidth::W32, left, right),
            Op::I32DivU => self.int_div_u(IntWidth::W32, left, right),
            Op::I32RemS => self.int_rem_s(IntWidth::W32, left, right),
            Op::I32RemU => self.int_rem_u(IntWidth::W32, left, right),

            Op::I64Add => self.mach_binop(Binop::I64Add, left, right),
            Op::I64Sub => self.mach_binop(Binop::I64Sub, left, right),
            Op::I64Mul => self.mach_binop(Binop::I64Mul, left, right),
            Op::I64And => self.mach_binop(Binop::I64And, left, right),
            Op::I64Or => self.mach_binop(Binop::I64Or, left, right),
            Op::I64Xor => self.mach_binop(Binop::I64Xor, left, right),
            Op::I64Shl => self.mach_binop(Binop::I64Shl, left, right),
            Op::I64ShrU => self.mach_binop(Binop::I64ShrU, left, right),
            Op::I64ShrS => self.mach_binop(Binop::I64ShrS, left, right),
            Op::I64Eq => self.mach_binop(Binop::I64Eq, left, right),
            Op::I64Ne => self.mach_binop(Binop::I64Ne, left, right),
            Op::I64LtS => self.mach_binop(Binop::I64LtS, left, right),
            Op::I64LeS => self.mach_binop(Binop::I64LeS, left, right),
            Op::I64LtU => self.mach_binop(Binop::I64LtU, left, right),
            Op::I64LeU => self.mach_binop(Binop::I64LeU, left, right),
            Op::I64GtS => self.mach_binop(Binop::I64LtS, right, left),
            Op::I64GeS => self.mach_binop(Binop::I64LeS, right, left),
            Op::I64GtU => self.mach_binop(Binop::I64LtU, right, left),
            Op::I64GeU => self.mach_binop(Binop::I64LeU, right, left),
            Op::I64DivS => self.int_div_s(IntWidth::W64, left, right),
            Op::I64DivU => self.int_div_u(IntWidth::W64, left, right),
            Op::I64RemS => self.int_rem_s(IntWidth::W64, left, right),
            Op::I64RemU => self.int_rem_u(IntWidth::W64, left, right),

            Op::F32Add => self.mach_binop(Binop::F32Add, left, right),
            Op::F32Sub => self.mach_binop(Binop::F32Sub, left, right),
            Op::F32Mul => self.mach_binop(Binop::F32Mul, left, right),
            Op::F32Div => self.mach_binop(Binop::F32Div, left, right),
            Op::F32Min => self.mach_binop(Binop::F32Min, left, right),
            Op::F32Max => self.mach_binop(Binop::F32Max, left, right),
            Op::F32Eq => self.mach_binop(Binop::F32Eq, left, right),
            Op::F32Ne => self.mach_binop(Binop::F32Ne, left, right),
            Op::F32Lt => self.mach_binop(Binop::F32Lt, left, right),
            Op::F32Le => self.mach_binop(Binop::F32Le, left, right),
            Op::F32Gt => self.mach_binop(Binop::F32Lt, right, left),
            Op::F32Ge => self.mach_binop(Binop::F32Le, right, left),
            Op::F32CopySign => self.copysign32(left, right),

            Op::F64Add => self.mach_binop(Binop::F64Add, left, right),
            Op::F64Sub => self.mach_binop(Binop::F64Sub, left, right),
            Op::F64Mul => self.mach_binop(Binop::F64Mul, left, right),
            Op::F64Div => self.mach_binop(Binop::F64Div, left, right),
            Op::F64Min => self.mach_binop(Binop::F64Min, left, right),
            Op::F64Max => self.mach_binop(Binop::F64Max, left, right),
            Op::F64Eq => self.mach_binop(Binop::F64Eq, left, right),
            Op::F64Ne => self.mach_binop(Binop::F64Ne, left, right),
            Op::F64Lt => self.mach_binop(Binop::F64Lt, left, right),
            Op::F64Le => self.mach_binop(Binop::F64Le, left, right),
            Op::F64Gt => self.mach_binop(Binop::F64Lt, right, left),
            Op::F64Ge => self.mach_binop(Binop::F64Le, right, left),
            Op::F64CopySign => self.copysign64(left, right),

            _ => unreachable!("binop invoked with non-binary opcode {:?}", op),
        }
    }

    /// Build a one-operand expression opcode
    pub fn unop(&mut self, op: Opcode, input: NodeId) -> NodeId {
        use Opcode as Op;
        match op {
            Op::BoolNot => {
                let zero = self.int32_constant(0);
                self.mach_binop(Binop::I32Eq, input, zero)
            }
            Op::I32Clz => self.mach_unop(Unop::I32Clz, input),
            Op::I64Clz => self.mach_unop(Unop::I64Clz, input),
            Op::I32Ctz => {
                if self.features.count_trailing_zeros {
                    self.mach_unop(Unop::I32Ctz, input)
                } else {
                    self.ctz_lowered(IntWidth::W32, input)
                }
            }
            Op::I64Ctz => {
                if self.features.count_trailing_zeros {
                    self.mach_unop(Unop::I64Ctz, input)
                } else {
                    self.ctz_lowered(IntWidth::W64, input)
                }
            }
            Op::I32Popcnt => self.popcnt(IntWidth::W32, input),
            Op::I64Popcnt => self.popcnt(IntWidth::W64, input),
            Op::F32Abs => self.mach_unop(Unop::F32Abs, input),
            Op::F32Neg => self.mach_unop(Unop::F32Neg, input),
            Op::F32Sqrt => self.mach_unop(Unop::F32Sqrt, input),
            Op::F64Abs => self.mach_unop(Unop::F64Abs, input),
            Op::F64Neg => self.mach_unop(Unop::F64Neg, input),
            Op::F64Sqrt => self.mach_unop(Unop::F64Sqrt, input),
            Op::I32ConvertI64 => self.mach_unop(Unop::I32ConvertI64, input),
            Op::I64SConvertI32 => self.mach_unop(Unop::I64SConvertI32, input),
            Op::I64UConvertI32 => self.mach_unop(Unop::I64UConvertI32, input),
            Op::I32SConvertF64 => self.mach_unop(Unop::I32SConvertF64, input),
            Op::I32UConvertF64 => self.mach_unop(Unop::I32UConvertF64, input),
            Op::F32SConvertI32 => self.mach_unop(Unop::F32SConvertI32, input),
            Op::F32UConvertI32 => self.mach_unop(Unop::F32UConvertI32, input),
            Op::F32ConvertF64 => self.mach_unop(Unop::F32ConvertF64, input),
            Op::F64SConvertI32 => self.mach_unop(Unop::F64SConvertI32, input),
            Op::F64UConvertI32 => self.mach_unop(Unop::F64UConvertI32, input),
            Op::F64ConvertF32 => self.mach_unop(Unop::F64ConvertF32, input),
            _ => unreachable!("unop invoked with non-unary opcode {:?}", op),
        }
    }

    // ===== Integer division =====

    fn int_eq(&mut self, width: IntWidth, left: NodeId, right: NodeId) -> NodeId {
        let op = match width {
            IntWidth::W32 => Binop::I32Eq,
            IntWidth::W64 => Binop::I64Eq,
        };
        self.mach_binop(op, left, right)
    }

    fn zero_check(&mut self, width: IntWidth, divisor: NodeId) {
        let zero = self.int_constant(width, 0);
        let is_zero = self.int_eq(width, divisor, zero);
        self.trap_if(TrapReason::DivByZero, is_zero, true);
    }

    fn int_div_s(&mut self, width: IntWidth, left: NodeId, right: NodeId) -> NodeId {
        self.zero_check(width, right);
        let min = match width {
            IntWidth::W32 => i32::MIN as i64,
            IntWidth::W64 => i64::MIN,
        };
        let min_const = self.int_constant(width, min);
        let neg_one = self.int_constant(width, -1);
        let lhs_is_min = self.int_eq(width, left, min_const);
        let rhs_is_neg_one = self.int_eq(width, right, neg_one);
        let unrepresentable = self.mach_binop(Binop::I32And, lhs_is_min, rhs_is_neg_one);
        self.trap_if(TrapReason::DivUnrepresentable, unrepresentable, true);
        let op = match width {
            IntWidth::W32 => Binop::I32DivS,
            IntWidth::W64 => Binop::I64DivS,
        };
        self.mach_binop(op, left, right)
    }

    fn int_div_u(&mut self, width: IntWidth, left: NodeId, right: NodeId) -> NodeId {
        self.zero_check(width, right);
        let op = match width {
            IntWidth::W32 => Binop::I32DivU,
            IntWidth::W64 => Binop::I64DivU,
        };
        self.mach_binop(op, left, right)
    }

    fn int_rem_u(&mut self, width: IntWidth, left: NodeId, right: NodeId) -> NodeId {
        self.zero_check(width, right);
        let op = match width {
            IntWidth::W32 => Binop::I32RemU,
            IntWidth::W64 => Binop::I64RemU,
        };
        self.mach_binop(op, left, right)
    }

    /// Signed remainder: remainder by -1 is 0 and must not reach the
    /// machine divide (INT_MIN rem -1 would fault on common targets).
    fn int_rem_s(&mut self, width: IntWidth, left: NodeId, right: NodeId) -> NodeId {
        self.zero_check(width, right);
        let neg_one = self.int_constant(width, -1);
        let is_neg_one = self.int_eq(width, right, neg_one);
        let (if_true, if_false) = self.branch(is_neg_one);
        let zero = self.int_constant(width, 0);
        let rem_op = match width {
            IntWidth::W32 => Binop::I32RemS,
            IntWidth::W64 => Binop::I64RemS,
        };
        let rem = self.mach_binop(rem_op, left, right);
        let merge = self.graph.new_node(Operator::Merge, vec![if_true, if_false]);
        let ty = match width {
            IntWidth::W32 => ValueType::I32,
            IntWidth::W64 => ValueType::I64,
        };
        let phi = self.graph.new_node(Operator::Phi(ty), vec![zero, rem, merge]);
        self.control = merge;
        phi
    }

    // ===== Bit-counting lowerings =====

    /// ctz(x) = popcnt(!(x | x<<1 | x<<2 | ...)): smear the lowest set bit
    /// upward, complement, count.
    fn ctz_lowered(&mut self, width: IntWidth, input: NodeId) -> NodeId {
        let (or_op, shl_op, xor_op, top_shift) = match width {
            IntWidth::W32 => (Binop::I32Or, Binop::I32Shl, Binop::I32Xor, 16),
            IntWidth::W64 => (Binop::I64Or, Binop::I64Shl, Binop::I64Xor, 32),
        };
        let mut value = input;
        let mut shift = 1;
        while shift <= top_shift {
            let amount = self.int_constant(width, shift);
            let shifted = self.mach_binop(shl_op, value, amount);
            value = self.mach_binop(or_op, value, shifted);
            shift <<= 1;
        }
        let all_ones = self.int_constant(width, -1);
        let inverted = self.mach_binop(xor_op, value, all_ones);
        self.popcnt(width, inverted)
    }

    fn popcnt(&mut self, width: IntWidth, input: NodeId) -> NodeId {
        if self.features.popcount {
            let op = match width {
                IntWidth::W32 => Unop::I32Popcnt,
                IntWidth::W64 => Unop::I64Popcnt,
            };
            return self.mach_unop(op, input);
        }
        self.popcnt_lowered(width, input)
    }

    /// SWAR popcount: fold pairs, nibbles, bytes, then words.
    fn popcnt_lowered(&mut self, width: IntWidth, input: NodeId) -> NodeId {
        let (sub, and, add, shr) = match width {
            IntWidth::W32 => (Binop::I32Sub, Binop::I32And, Binop::I32Add, Binop::I32ShrU),
            IntWidth::W64 => (Binop::I64Sub, Binop::I64And, Binop::I64Add, Binop::I64ShrU),
        };
        let (m1, m2, m4, max_bits) = match width {
            IntWidth::W32 => (0x5555_5555, 0x3333_3333, 0x0f0f_0f0f, 0x3f),
            IntWidth::W64 => (
                0x5555_5555_5555_5555_u64 as i64,
                0x3333_3333_3333_3333,
                0x0f0f_0f0f_0f0f_0f0f,
                0x7f,
            ),
        };

        // v = v - ((v >> 1) & m1)
        let one = self.int_constant(width, 1);
        let m1c = self.int_constant(width, m1);
        let t = self.mach_binop(shr, input, one);
        let t = self.mach_binop(and, t, m1c);
        let mut v = self.mach_binop(sub, input, t);

        // v = (v & m2) + ((v >> 2) & m2)
        let two = self.int_constant(width, 2);
        let m2c = self.int_constant(width, m2);
        let lo = self.mach_binop(and, v, m2c);
        let hi = self.mach_binop(shr, v, two);
        let hi = self.mach_binop(and, hi, m2c);
        v = self.mach_binop(add, lo, hi);

        // v = (v + (v >> 4)) & m4
        let four = self.int_constant(width, 4);
        let m4c = self.int_constant(width, m4);
        let t = self.mach_binop(shr, v, four);
        let t = self.mach_binop(add, v, t);
        v = self.mach_binop(and, t, m4c);

        // fold bytes and (for 64-bit) words
        let mut fold = 8;
        let word_bits = match width {
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        };
        while fold < word_bits {
            let amount = self.int_constant(width, fold);
            let t = self.mach_binop(shr, v, amount);
            v = self.mach_binop(add, v, t);
            fold <<= 1;
        }
        let mask = self.int_constant(width, max_bits);
        self.mach_binop(and, v, mask)
    }

    // ===== Copysign lowerings =====

    fn copysign32(&mut self, left: NodeId, right: NodeId) -> NodeId {
        let left_bits = self.mach_unop(Unop::BitcastF32ToI32, left);
        let right_bits = self.mach_unop(Unop::BitcastF32ToI32, right);
        let mag_mask = self.int32_constant(0x7fff_ffff);
        let sign_mask = self.int32_constant(i32::MIN);
        let magnitude = self.mach_binop(Binop::I32And, left_bits, mag_mask);
        let sign = self.mach_binop(Binop::I32And, right_bits, sign_mask);
        let combined = self.mach_binop(Binop::I32Or, magnitude, sign);
        self.mach_unop(Unop::BitcastI32ToF32, combined)
    }

    fn copysign64(&mut self, left: NodeId, right: NodeId) -> NodeId {
        if self.features.word64 {
            let left_bits = self.mach_unop(Unop::BitcastF64ToI64, left);
            let right_bits = self.mach_unop(Unop::BitcastF64ToI64, right);
            let mag_mask = self.int64_constant(0x7fff_ffff_ffff_ffff);
            let sign_mask = self.int64_constant(i64::MIN);
            let magnitude = self.mach_binop(Binop::I64And, left_bits, mag_mask);
            let sign = self.mach_binop(Binop::I64And, right_bits, sign_mask);
            let combined = self.mach_binop(Binop::I64Or, magnitude, sign);
            return self.mach_unop(Unop::BitcastI64ToF64, combined);
        }
        // Without 64-bit bit-ops only the sign-carrying high word is touched.
        let left_hi = self.mach_unop(Unop::F64ExtractHighWord32, left);
        let right_hi = self.mach_unop(Unop::F64ExtractHighWord32, right);
        let mag_mask = self.int32_constant(0x7fff_ffff);
        let sign_mask = self.int32_constant(i32::MIN);
        let magnitude = self.mach_binop(Binop::I32And, left_hi, mag_mask);
        let sign = self.mach_binop(Binop::I32And, right_hi, sign_mask);
        let combined = self.mach_binop(Binop::I32Or, magnitude, sign);
        self.mach_binop(Binop::F64InsertHighWord32, left, combined)
    }

    // ===== Locals =====

    /// Read a local slot through the effect chain
    pub fn load_local(&mut self, index: u16) -> NodeId {
        let load = self
            .graph
            .new_node(Operator::LoadLocal(index), vec![self.effect]);
        self.effect = load;
        load
    }

    /// Write a local slot
    pub fn store_local(&mut self, index: u16, value: NodeId) -> NodeId {
        let store = self
            .graph
            .new_node(Operator::StoreLocal(index), vec![value, self.effect]);
        self.effect = store;
        store
    }

    // ===== Globals =====

    fn module_env(&self) -> &'a ModuleEnv {
        self.module
            .expect("builder invoked without a module environment")
    }

    /// Read a module global
    pub fn load_global(&mut self, index: usize) -> NodeId {
        let module = self.module_env();
        let global = module
            .global(index)
            .expect("global index verified by the decoder");
        let base = self.intptr_constant(module.globals_base + global.offset as u64);
        let zero = self.int32_constant(0);
        let load = self.graph.new_node(
            Operator::Load(global.mem_type),
            vec![base, zero, self.effect],
        );
        self.effect = load;
        load
    }

    /// Write a module global
    pub fn store_global(&mut self, index: usize, value: NodeId) -> NodeId {
        let module = self.module_env();
        let global = module
            .global(index)
            .expect("global index verified by the decoder");
        let base = self.intptr_constant(module.globals_base + global.offset as u64);
        let zero = self.int32_constant(0);
        let store = self.graph.new_node(
            Operator::Store(global.mem_type),
            vec![base, zero, value, self.effect],
        );
        self.effect = store;
        store
    }

    // ===== Linear memory =====

    fn extend_index(&mut self, index: NodeId) -> NodeId {
        match self.features.pointer_width {
            PointerWidth::P64 => self.mach_unop(Unop::ChangeUint32ToUint64, index),
            PointerWidth::P32 => index,
        }
    }

    /// Emit the bounds check for a `width`-byte access at static `offset`,
    /// returning the base and extended index for the machine access.
    ///
    /// A statically out-of-range offset reduces the check to constant
    /// false: the access always traps, but the check is still emitted so
    /// the trap branch materializes.
    fn bounds_check(&mut self, offset: u32, width: u8, index: NodeId) -> (NodeId, NodeId) {
        let module = self.module_env();
        let size = module.memory_size();
        let statically_oob =
            offset as u64 >= size || offset as u64 + width as u64 > size;
        let check = if statically_oob {
            self.int32_constant(0)
        } else {
            let limit = size - offset as u64 - width as u64;
            let limit = self.int32_constant(limit.min(u32::MAX as u64) as u32 as i32);
            self.mach_binop(Binop::I32LeU, index, limit)
        };
        self.trap_if(TrapReason::MemOutOfBounds, check, false);
        let effective_offset = if statically_oob { 0 } else { offset as u64 };
        let base = self.intptr_constant(module.mem_start + effective_offset);
        let index = self.extend_index(index);
        (base, index)
    }

    fn checked_operands(&mut self, offset: u32, index: NodeId) -> (NodeId, NodeId, NodeId) {
        let module = self.module_env();
        let index = if offset != 0 {
            let offset = self.int32_constant(offset as i32);
            self.mach_binop(Binop::I32Add, index, offset)
        } else {
            index
        };
        let index = self.extend_index(index);
        let base = self.intptr_constant(module.mem_start);
        let limit = self.intptr_constant(module.memory_size());
        (base, index, limit)
    }

    /// Typed load from linear memory
    ///
    /// Default semantics bounds-check and trap; under asm.js semantics a
    /// checked load yields zero for out-of-bounds indices. i64 loads
    /// narrower than 8 bytes are widened with an explicit extension.
    pub fn load_mem(&mut self, op: Opcode, offset: u32, index: NodeId) -> NodeId {
        let mem_type = op.mem_type().expect("load opcode has a memory type");
        let asm_js = self.module_env().asm_js;
        let load = if asm_js {
            let (base, index, limit) = self.checked_operands(offset, index);
            self.graph.new_node(
                Operator::CheckedLoad(mem_type),
                vec![base, index, limit, self.effect],
            )
        } else {
            let (base, index) = self.bounds_check(offset, mem_type.width(), index);
            self.graph
                .new_node(Operator::Load(mem_type), vec![base, index, self.effect])
        };
        self.effect = load;
        match op {
            Opcode::I64LoadMem32S => self.mach_unop(Unop::I64SConvertI32, load),
            Opcode::I64LoadMem32U => self.mach_unop(Unop::I64UConvertI32, load),
            _ => load,
        }
    }

    /// Typed store to linear memory; the expression value is the stored value
    pub fn store_mem(&mut self, op: Opcode, offset: u32, index: NodeId, value: NodeId) -> NodeId {
        let mem_type = op.mem_type().expect("store opcode has a memory type");
        let stored = match op {
            // Narrowing i64 store writes the low word
            Opcode::I64StoreMem32 => self.mach_unop(Unop::I32ConvertI64, value),
            _ => value,
        };
        let asm_js = self.module_env().asm_js;
        let store = if asm_js {
            let (base, index, limit) = self.checked_operands(offset, index);
            self.graph.new_node(
                Operator::CheckedStore(mem_type),
                vec![base, index, stored, limit, self.effect],
            )
        } else {
            let (base, index) = self.bounds_check(offset, mem_type.width(), index);
            self.graph.new_node(
                Operator::Store(mem_type),
                vec![base, index, stored, self.effect],
            )
        };
        self.effect = store;
        value
    }

    // ===== Calls =====

    fn finish_call(&mut self, sig: &FuncSig, code: NodeId, mark: usize) -> NodeId {
        let mut inputs = Vec::with_capacity(self.args.len() - mark + 3);
        inputs.push(code);
        inputs.extend(self.args.drain(mark..));
        inputs.push(self.effect);
        inputs.push(self.control);
        let call = self.graph.new_node(Operator::Call(sig.clone()), inputs);
        self.effect = call;
        call
    }

    /// Direct call: the callee's code handle becomes the first input slot
    pub fn call_direct(&mut self, sig: &FuncSig, code: CodeRef, mark: usize) -> NodeId {
        let code = self.graph.new_node(Operator::CodeConstant(code), Vec::new());
        self.finish_call(sig, code, mark)
    }

    /// Indirect call: bounds-check the key against the table, check the
    /// slot signature against `sig_index`, load the code handle, then call.
    pub fn call_indirect(
        &mut self,
        sig_index: u32,
        sig: &FuncSig,
        key: NodeId,
        mark: usize,
    ) -> NodeId {
        let module = self.module_env();
        let (table_address, table_size) = match &module.table {
            Some(table) => (table.address, table.size()),
            None => (0, 0),
        };

        let size_const = self.int32_constant(table_size as i32);
        let in_bounds = self.mach_binop(Binop::I32LtU, key, size_const);
        self.trap_if(TrapReason::FuncInvalid, in_bounds, false);

        let word_type = match self.features.pointer_width {
            PointerWidth::P64 => MemType::Int64,
            PointerWidth::P32 => MemType::Int32,
        };
        let shift = self.int32_constant(self.features.pointer_width.log2_bytes() as i32);
        let base = self.intptr_constant(table_address);

        // Slot i holds the signature index as a tagged small integer
        let sig_slot = self.mach_binop(Binop::I32Shl, key, shift);
        let sig_slot = self.extend_index(sig_slot);
        let loaded_sig = self.graph.new_node(
            Operator::Load(word_type),
            vec![base, sig_slot, self.effect],
        );
        self.effect = loaded_sig;
        let expected = self
            .graph
            .new_node(Operator::SmiConstant(sig_index), Vec::new());
        let word_eq = match self.features.pointer_width {
            PointerWidth::P64 => Binop::I64Eq,
            PointerWidth::P32 => Binop::I32Eq,
        };
        let sig_match = self.mach_binop(word_eq, loaded_sig, expected);
        self.trap_if(TrapReason::FuncSigMismatch, sig_match, false);

        // Slot i + table_size holds the code handle
        let code_index = self.mach_binop(Binop::I32Add, key, size_const);
        let code_slot = self.mach_binop(Binop::I32Shl, code_index, shift);
        let code_slot = self.extend_index(code_slot);
        let code = self.graph.new_node(
            Operator::Load(word_type),
            vec![base, code_slot, self.effect],
        );
        self.effect = code;

        self.finish_call(sig, code, mark)
    }

    // ===== Control =====

    /// Branch at the current control; returns the (if-true, if-false)
    /// projections without moving the cursor.
    pub fn branch(&mut self, cond: NodeId) -> (NodeId, NodeId) {
        let branch = self
            .graph
            .new_node(Operator::Branch, vec![cond, self.control]);
        let if_true = self.graph.new_node(Operator::IfTrue, vec![branch]);
        let if_false = self.graph.new_node(Operator::IfFalse, vec![branch]);
        (if_true, if_false)
    }

    /// Control merge of `controls`
    pub fn merge(&mut self, controls: &[NodeId]) -> NodeId {
        self.graph.new_node(Operator::Merge, controls.to_vec())
    }

    /// Value phi at `merge`; one value per merge predecessor, in order
    pub fn phi(&mut self, ty: ValueType, values: &[NodeId], merge: NodeId) -> NodeId {
        let mut inputs = values.to_vec();
        inputs.push(merge);
        self.graph.new_node(Operator::Phi(ty), inputs)
    }

    /// Effect phi at `merge`
    pub fn effect_phi(&mut self, effects: &[NodeId], merge: NodeId) -> NodeId {
        let mut inputs = effects.to_vec();
        inputs.push(merge);
        self.graph.new_node(Operator::EffectPhi, inputs)
    }

    /// Open a loop: a Loop header with the current control as its entry
    /// edge and an EffectPhi carrying the entry effect. The cursors move
    /// into the loop. Back edges are appended later.
    pub fn loop_header(&mut self) -> (NodeId, NodeId) {
        let header = self.graph.new_node(Operator::Loop, vec![self.control]);
        let effect_phi = self
            .graph
            .new_node(Operator::EffectPhi, vec![self.effect, header]);
        self.control = header;
        self.effect = effect_phi;
        (header, effect_phi)
    }

    /// Append a back edge to a loop header and its effect phi
    pub fn add_back_edge(
        &mut self,
        header: NodeId,
        effect_phi: NodeId,
        control: NodeId,
        effect: NodeId,
    ) {
        self.graph.append_merge_input(header, control);
        self.graph.append_phi_input(effect_phi, effect);
    }

    /// Switch on `key` with `case_count` value projections
    pub fn switch(&mut self, key: NodeId, case_count: u32) -> NodeId {
        self.graph
            .new_node(Operator::Switch { case_count }, vec![key, self.control])
    }

    /// Projection of a switch for key == `value`
    pub fn if_value(&mut self, switch: NodeId, value: i32) -> NodeId {
        self.graph.new_node(Operator::IfValue(value), vec![switch])
    }

    /// Default projection of a switch
    pub fn if_default(&mut self, switch: NodeId) -> NodeId {
        self.graph.new_node(Operator::IfDefault, vec![switch])
    }

    /// Return; a missing value returns a single zero
    pub fn ret(&mut self, value: Option<NodeId>) {
        let value = match value {
            Some(v) => v,
            None => self.int32_constant(0),
        };
        let ret = self
            .graph
            .new_node(Operator::Return, vec![value, self.effect, self.control]);
        self.graph.add_end_input(ret);
    }

    /// Mark an infinite loop so End observes it
    pub fn terminate(&mut self, effect: NodeId, control: NodeId) {
        let terminate = self
            .graph
            .new_node(Operator::Terminate, vec![effect, control]);
        self.graph.add_end_input(terminate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_ops(graph: &Graph, name: &str) -> usize {
        graph.op_histogram().get(name).copied().unwrap_or(0)
    }

    fn has_unop(graph: &Graph, op: Unop) -> bool {
        graph.iter().any(|(_, n)| n.op == Operator::Unop(op))
    }

    #[test]
    fn test_div_s_inserts_two_trap_checks() {
        let mut graph = Graph::new();
        let mut b = GraphBuilder::new(&mut graph, MachineFeatures::host(), None, 2);
        let l = b.load_local(0);
        let r = b.load_local(1);
        let div = b.binop(Opcode::I32DivS, l, r);
        b.ret(Some(div));

        // zero check + INT_MIN/-1 check
        assert_eq!(count_ops(&graph, "Branch"), 2);
        assert!(graph
            .iter()
            .any(|(_, n)| n.op == Operator::Binop(Binop::I32DivS)));
        // Verification-only build: both trap reasons share no block
        assert_eq!(count_ops(&graph, "Merge"), 2);
    }

    #[test]
    fn test_rem_s_short_circuits_minus_one() {
        let mut graph = Graph::new();
        let mut b = GraphBuilder::new(&mut graph, MachineFeatures::host(), None, 2);
        let l = b.load_local(0);
        let r = b.load_local(1);
        let rem = b.binop(Opcode::I32RemS, l, r);
        b.ret(Some(rem));

        // The result is a phi over {0, l rem r}
        assert_eq!(graph.node(rem).op, Operator::Phi(ValueType::I32));
        assert_eq!(count_ops(&graph, "Phi"), 1);
        assert!(graph
            .iter()
            .any(|(_, n)| n.op == Operator::Binop(Binop::I32RemS)));
    }

    #[test]
    fn test_repeated_div_shares_trap_block() {
        let mut graph = Graph::new();
        let mut b = GraphBuilder::new(&mut graph, MachineFeatures::host(), None, 2);
        let l = b.load_local(0);
        let r = b.load_local(1);
        let d1 = b.binop(Opcode::I32DivU, l, r);
        let d2 = b.binop(Opcode::I32DivU, d1, r);
        b.ret(Some(d2));

        // Two zero checks but a single DivByZero trap block (one sentinel
        // return into End)
        assert_eq!(count_ops(&graph, "Branch"), 2);
        let end = graph.end().unwrap();
        assert_eq!(graph.node(end).inputs.len(), 2); // trap return + ret
    }

    #[test]
    fn test_ctz_lowering_avoids_ctz_operator() {
        let mut features = MachineFeatures::host();
        features.count_trailing_zeros = false;
        features.popcount = false;

        let mut graph = Graph::new();
        let mut b = GraphBuilder::new(&mut graph, features, None, 1);
        let x = b.load_local(0);
        let ctz = b.unop(Opcode::I32Ctz, x);
        b.ret(Some(ctz));

        assert!(!has_unop(&graph, Unop::I32Ctz));
        assert!(!has_unop(&graph, Unop::I32Popcnt));
        // Smear uses or/shl chains
        assert!(graph
            .iter()
            .any(|(_, n)| n.op == Operator::Binop(Binop::I32Shl)));
    }

    #[test]
    fn test_popcnt_native_when_available() {
        let mut graph = Graph::new();
        let mut b = GraphBuilder::new(&mut graph, MachineFeatures::host(), None, 1);
        let x = b.load_local(0);
        let p = b.unop(Opcode::I32Popcnt, x);
        b.ret(Some(p));
        assert!(has_unop(&graph, Unop::I32Popcnt));
    }

    #[test]
    fn test_copysign64_on_32bit_uses_high_word() {
        let features = MachineFeatures::baseline32();
        let mut graph = Graph::new();
        let mut b = GraphBuilder::new(&mut graph, features, None, 2);
        let l = b.float64_constant(1.5);
        let r = b.float64_constant(-2.0);
        let c = b.binop(Opcode::F64CopySign, l, r);
        b.ret(Some(c));

        assert!(has_unop(&graph, Unop::F64ExtractHighWord32));
        assert_eq!(
            graph.node(c).op,
            Operator::Binop(Binop::F64InsertHighWord32)
        );
        assert!(!has_unop(&graph, Unop::BitcastF64ToI64));
    }

    #[test]
    fn test_gt_swaps_to_lt() {
        let mut graph = Graph::new();
        let mut b = GraphBuilder::new(&mut graph, MachineFeatures::host(), None, 2);
        let l = b.load_local(0);
        let r = b.load_local(1);
        let gt = b.binop(Opcode::I32GtS, l, r);
        let node = graph.node(gt);
        assert_eq!(node.op, Operator::Binop(Binop::I32LtS));
        assert_eq!(node.inputs, vec![r, l]);
    }

    #[test]
    fn test_effect_chain_threads_locals() {
        let mut graph = Graph::new();
        let mut b = GraphBuilder::new(&mut graph, MachineFeatures::host(), None, 1);
        let a = b.load_local(0);
        let st = b.store_local(0, a);
        assert_eq!(b.effect(), st);

        let start = graph.start().unwrap();
        assert_eq!(graph.node(a).inputs, vec![start]);
        assert_eq!(graph.node(st).inputs, vec![a, a]);
    }
}
