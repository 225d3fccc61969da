//! Op streams for executable units: argument addressing, register and scope
//! tracking, jump resolution, dead-code elimination, the op codec, and
//! execution with deferred operands.

pub mod arg;
mod builder;
mod code;
mod decoder;
mod exec;
mod instruction;
mod op;
mod registry;
mod scope;

pub use arg::{Argument, Register, RegisterId};
pub use builder::{CodeBuilder, Label};
pub use code::{Code, OpInfo};
pub use decoder::OpDecoder;
pub use exec::{Continuation, Frame, Operand, Pending, ResumeQueue, Step};
pub use instruction::{Instruction, Target};
pub use op::OpCode;
pub use registry::ConstantRegistry;
pub use scope::{ExitedScope, Scope, ScopeId};

#[cfg(test)]
mod tests {
    use super::*;
    use pool::ConstantPool;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn read_back(bytes: &[u8], constants: &[pool::ConstId], params: u32) -> Code {
        let mut r = bytes;
        Code::read(&mut r, constants, params).unwrap()
    }

    #[test]
    fn round_trip() {
        init();
        let mut pool = ConstantPool::new();
        let int = pool.ensure_string("Int");
        let ten = pool.ensure_int(10);

        let mut b = CodeBuilder::new(1);
        let v = b.var(int, Some("v"));
        b.mov(Argument::Constant(ten), Argument::Register(v));
        let zero = b.jump_if(OpCode::JumpZero, Argument::Register(v));
        b.return1(Argument::Constant(ten));
        b.bind(zero);
        b.return1(Argument::Register(v));
        let mut code = b.finish();

        let (bytes, constants) = code.assemble(&pool).unwrap();
        assert_eq!(constants, [ten, int]);

        let code = read_back(&bytes, &constants, 1);
        assert_eq!(code.ops(), [
            Instruction::Var { ty: Argument::Constant(int), reg: None },
            Instruction::Move { from: Argument::Constant(ten), to: Argument::Slot(1) },
            Instruction::JumpIf {
                code: OpCode::JumpZero,
                value: Argument::Slot(1),
                target: Target { offset: 2, dest: Some(4), exits: 0 },
            },
            Instruction::Return1 { value: Argument::Constant(ten) },
            Instruction::Return1 { value: Argument::Slot(1) },
        ]);
        assert_eq!(code.max_vars(), 2);
    }

    #[test]
    fn backward_jump() {
        let mut pool = ConstantPool::new();
        let int = pool.ensure_string("Int");

        let mut b = CodeBuilder::new(0);
        let v = b.var(int, None);
        let top = b.current_offset();
        b.nop();
        b.jump_back_if(OpCode::JumpTrue, Argument::Register(v), top);
        b.return0();
        let mut code = b.finish();

        let (bytes, constants) = code.assemble(&pool).unwrap();
        let code = read_back(&bytes, &constants, 0);
        assert_eq!(code.op(2).target().map(|t| t.offset), Some(-1));
        assert_eq!(code.op(2).target().and_then(|t| t.dest), Some(1));
    }

    #[test]
    fn jump_out_of_range_is_rejected() {
        // count 1, JMP +5
        let bytes = [0x03, OpCode::Jump as u8, 0x0B];
        let mut r = &bytes[..];
        assert!(Code::read(&mut r, &[], 0).is_err());
    }

    #[test]
    fn unknown_op_code_is_rejected() {
        let bytes = [0x03, OpCode::COUNT as u8];
        let mut r = &bytes[..];
        let err = OpDecoder::new(&mut r, &[]).unwrap().next().unwrap().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn display_instructions() {
        assert_eq!(Instruction::Return0.to_string(), "RETURN_0");
        assert_eq!(
            Instruction::Move { from: Argument::Slot(0), to: Argument::Predefined(arg::A_STACK) }.to_string(),
            "MOV #0, this:stack"
        );
        assert_eq!(Instruction::Jump { target: Target::offset(-3) }.to_string(), "JMP -3");
        assert_eq!(
            Instruction::jump_if(OpCode::JumpNull, Argument::Slot(2), Target::to(7)).to_string(),
            "JMP_NULL #2, -> 7"
        );
    }
}
