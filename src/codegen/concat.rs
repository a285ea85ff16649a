//! String concatenation.
//!
//! `"id=" + ID + '!'` compiles to either a `StringBuilder` chain (before Java 9) or an
//! `invokedynamic` call of `StringConcatFactory.makeConcatWithConstants`, where literal
//! parts are baked into a recipe and every other operand is a call site argument
//! standing in for a `\u0001` tag.

use crate::{
    bytecode::{Constant, Handle, HandleKind, Instruction, InvokeDynamicInsn, Opcode, JAVA_9},
    codegen::{ConcatStrategy, EmitContext, ExpressionGenerator},
    expression::{BinaryOp, DataType, Expression},
    Result,
};

const STRING_BUILDER: &str = "java/lang/StringBuilder";
const CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";
const CONCAT_BOOTSTRAP: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;";
const TAG_ARG: char = '\u{1}';
const TAG_CONST: char = '\u{2}';

impl ExpressionGenerator<'_> {
    /// Emits a string-typed `+` chain.
    pub(super) fn emit_concat(
        &self,
        context: &EmitContext<'_>,
        expression: &Expression,
    ) -> Result<Vec<Instruction>> {
        let mut operands = Vec::new();
        self.flatten_concat(expression, &mut operands)?;

        let indy = match self.concat {
            ConcatStrategy::Auto => context.major_version >= JAVA_9,
            ConcatStrategy::StringBuilder => false,
            ConcatStrategy::InvokeDynamic => true,
        };
        if indy {
            self.concat_indy(context, &operands)
        } else {
            self.concat_builder(context, &operands)
        }
    }

    /// Splits a left-leaning chain of string `+` into its operands. A `+` whose left
    /// side is not yet a string (`1 + 2 + "x"`) stays a single numeric operand.
    fn flatten_concat<'e>(
        &self,
        expression: &'e Expression,
        operands: &mut Vec<&'e Expression>,
    ) -> Result<()> {
        if let Expression::Binary(BinaryOp::Add, lhs, rhs) = expression {
            if self.type_of(expression)? == DataType::String {
                self.flatten_concat(lhs, operands)?;
                operands.push(rhs);
                return Ok(());
            }
        }
        operands.push(expression);
        Ok(())
    }

    fn concat_builder(
        &self,
        context: &EmitContext<'_>,
        operands: &[&Expression],
    ) -> Result<Vec<Instruction>> {
        let mut insns = vec![
            Instruction::Type(Opcode::New, STRING_BUILDER.to_string()),
            Instruction::Simple(Opcode::Dup),
            Instruction::method(Opcode::Invokespecial, STRING_BUILDER, "<init>", "()V"),
        ];
        for operand in operands {
            let (code, data_type) = self.emit_expr(context, operand, None)?;
            insns.extend(code);
            let argument = match data_type {
                DataType::String => "Ljava/lang/String;",
                DataType::Class => "Ljava/lang/Object;",
                DataType::Char => "C",
                DataType::Long => "J",
                DataType::Float => "F",
                DataType::Double => "D",
                _ => "I",
            };
            insns.push(Instruction::method(
                Opcode::Invokevirtual,
                STRING_BUILDER,
                "append",
                format!("({argument})Ljava/lang/StringBuilder;"),
            ));
        }
        insns.push(Instruction::method(
            Opcode::Invokevirtual,
            STRING_BUILDER,
            "toString",
            "()Ljava/lang/String;",
        ));
        Ok(insns)
    }

    fn concat_indy(
        &self,
        context: &EmitContext<'_>,
        operands: &[&Expression],
    ) -> Result<Vec<Instruction>> {
        let mut insns = Vec::new();
        let mut recipe = String::new();
        let mut arguments = String::new();
        for operand in operands {
            if let Expression::Literal(literal) = operand {
                let text = literal.value().to_java_string();
                if !text.contains([TAG_ARG, TAG_CONST]) {
                    recipe.push_str(&text);
                    continue;
                }
            }
            let (code, data_type) = self.emit_expr(context, operand, None)?;
            insns.extend(code);
            recipe.push(TAG_ARG);
            arguments.push_str(&data_type.descriptor());
        }

        insns.push(Instruction::InvokeDynamic(InvokeDynamicInsn {
            name: "makeConcatWithConstants".to_string(),
            descriptor: format!("({arguments})Ljava/lang/String;"),
            bootstrap: Handle {
                kind: HandleKind::InvokeStatic,
                owner: CONCAT_FACTORY.to_string(),
                name: "makeConcatWithConstants".to_string(),
                descriptor: CONCAT_BOOTSTRAP.to_string(),
                is_interface: false,
            },
            bootstrap_args: vec![Constant::String(recipe)],
        }));
        Ok(insns)
    }
}
