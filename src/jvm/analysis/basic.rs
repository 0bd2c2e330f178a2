use super::{Interpreter, Value};
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::{ExceptionHandler, InsnIndex, Instruction};
use crate::jvm::{BaseType, BinaryName, FieldType, RefType, RenderDescriptor};
use crate::util::Width;
use std::fmt;

/// Size and kind of a value
///
/// This is a flat lattice: equal values merge to themselves and references merge to a common
/// supertype. A slot that is unassigned on one side stays unassigned (it can't be used anyway).
/// Anything else merges to `Conflict`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BasicValue {
    /// Unassigned local, or the second slot of a `long`/`double` local
    Uninitialized,
    Int,
    Float,
    Long,
    Double,

    /// Reference of a known type, or `None` for any object (including `null`)
    Reference(Option<RefType<BinaryName>>),

    /// Address pushed by `jsr`
    ReturnAddress,

    /// Merge of incompatible values
    Conflict,
}

impl BasicValue {
    pub fn from_field_type(field_type: &FieldType<BinaryName>) -> BasicValue {
        match field_type {
            FieldType::Base(BaseType::Long) => BasicValue::Long,
            FieldType::Base(BaseType::Float) => BasicValue::Float,
            FieldType::Base(BaseType::Double) => BasicValue::Double,
            FieldType::Base(_) => BasicValue::Int,
            FieldType::Ref(ref_type) => BasicValue::Reference(Some(ref_type.clone())),
        }
    }

    pub fn object(class: BinaryName) -> BasicValue {
        BasicValue::Reference(Some(RefType::Object(class)))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, BasicValue::Reference(_))
    }

    /// Value produced by an instruction, when that doesn't depend on the operands
    fn produced_by(insn: &Instruction) -> BasicValue {
        use Instruction::*;

        match insn {
            AConstNull | ALoad(_) | AALoad => BasicValue::Reference(None),

            IConstM1
            | IConst0
            | IConst1
            | IConst2
            | IConst3
            | IConst4
            | IConst5
            | BiPush(_)
            | SiPush(_)
            | ILoad(_)
            | IALoad
            | BALoad
            | CALoad
            | SALoad
            | IAdd
            | ISub
            | IMul
            | IDiv
            | IRem
            | INeg
            | ISh(_)
            | IAnd
            | IOr
            | IXor
            | IInc(_,
            | _)
            | L2I
            | F2I
            | D2I
            | I2B
            | I2C
            | I2S
            | LCmp
            | FCmp(_)
            | DCmp(_)
            | ArrayLength
            | InstanceOf(_) => BasicValue::Int,

            LConst0 | LConst1 | LLoad(_) | LALoad | LAdd | LSub | LMul | LDiv | LRem | LNeg
            | LSh(_) | LAnd | LOr | LXor | I2L | F2L | D2L => BasicValue::Long,

            FConst0 | FConst1 | FConst2 | FLoad(_) | FALoad | FAdd | FSub | FMul | FDiv | FRem
            | FNeg | I2F | L2F | D2F => BasicValue::Float,

            DConst0 | DConst1 | DLoad(_) | DALoad | DAdd | DSub | DMul | DDiv | DRem | DNeg
            | I2D | L2D | F2D => BasicValue::Double,

            Ldc(constant) | LdcW(constant) | Ldc2W(constant) => {
                BasicValue::from_field_type(&constant.field_type())
            }
            GetStatic(field_type) | GetField(field_type) => BasicValue::from_field_type(field_type),
            Invoke(_, descriptor) | InvokeDynamic(descriptor) => descriptor
                .return_type
                .as_ref()
                .map_or(BasicValue::Uninitialized, BasicValue::from_field_type),

            New(class) => BasicValue::object(class.clone()),
            NewArray(base_type) => {
                BasicValue::Reference(Some(RefType::array(FieldType::Base(*base_type))))
            }
            ANewArray(ref_type) => {
                BasicValue::Reference(Some(RefType::array(FieldType::Ref(ref_type.clone()))))
            }
            CheckCast(ref_type) | MultiANewArray(ref_type, _) => {
                BasicValue::Reference(Some(ref_type.clone()))
            }

            _ => BasicValue::Uninitialized,
        }
    }
}

impl Width for BasicValue {
    fn width(&self) -> usize {
        match self {
            BasicValue::Long | BasicValue::Double => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for BasicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BasicValue::Uninitialized => f.write_str("."),
            BasicValue::Int => f.write_str("I"),
            BasicValue::Float => f.write_str("F"),
            BasicValue::Long => f.write_str("J"),
            BasicValue::Double => f.write_str("D"),
            BasicValue::Reference(None) => f.write_str("R"),
            BasicValue::Reference(Some(ref_type)) => f.write_str(&ref_type.render()),
            BasicValue::ReturnAddress => f.write_str("A"),
            BasicValue::Conflict => f.write_str("X"),
        }
    }
}

impl Value for BasicValue {
    fn is_conflict(&self) -> bool {
        matches!(self, BasicValue::Conflict)
    }
}

/// Interpreter for [`BasicValue`]
///
/// With a class graph, two class types merge to their nearest common superclass. Without one (or
/// when either class is missing from the graph, or for array types) differing reference types
/// merge to "any object".
#[derive(Default)]
pub struct BasicInterpreter<'a, 'g> {
    class_graph: Option<&'a ClassGraph<'g>>,
}

impl<'a, 'g> BasicInterpreter<'a, 'g> {
    pub fn new() -> Self {
        BasicInterpreter { class_graph: None }
    }

    pub fn with_class_graph(class_graph: &'a ClassGraph<'g>) -> Self {
        BasicInterpreter {
            class_graph: Some(class_graph),
        }
    }

    fn merge_references(
        &self,
        ref1: &Option<RefType<BinaryName>>,
        ref2: &Option<RefType<BinaryName>>,
    ) -> Option<RefType<BinaryName>> {
        match (ref1, ref2) {
            (Some(RefType::Object(class1)), Some(RefType::Object(class2))) => self
                .class_graph?
                .common_superclass(class1, class2)
                .map(RefType::Object),
            _ => None,
        }
    }
}

impl<'a, 'g> Interpreter for BasicInterpreter<'a, 'g> {
    type Value = BasicValue;

    fn new_parameter(&self, field_type: &FieldType<BinaryName>) -> BasicValue {
        BasicValue::from_field_type(field_type)
    }

    fn new_uninitialized(&self) -> BasicValue {
        BasicValue::Uninitialized
    }

    fn new_return_address(&self, _at: InsnIndex) -> BasicValue {
        BasicValue::ReturnAddress
    }

    fn new_exception(&self, _index: usize, handler: &ExceptionHandler<InsnIndex>) -> BasicValue {
        let class = handler.catch_type.clone().unwrap_or(BinaryName::THROWABLE);
        BasicValue::object(class)
    }

    fn new_operation(&self, _at: InsnIndex, insn: &Instruction) -> BasicValue {
        BasicValue::produced_by(insn)
    }

    fn copy_operation(
        &self,
        _at: InsnIndex,
        _insn: &Instruction,
        value: &BasicValue,
    ) -> BasicValue {
        value.clone()
    }

    fn unary_operation(
        &self,
        _at: InsnIndex,
        insn: &Instruction,
        _value: &BasicValue,
    ) -> BasicValue {
        BasicValue::produced_by(insn)
    }

    fn binary_operation(
        &self,
        _at: InsnIndex,
        insn: &Instruction,
        array: &BasicValue,
        _value2: &BasicValue,
    ) -> BasicValue {
        match (insn, array) {
            (Instruction::AALoad, BasicValue::Reference(Some(array_type))) => {
                match array_type.element_type() {
                    Some(element_type @ FieldType::Ref(_)) => {
                        BasicValue::from_field_type(&element_type)
                    }
                    _ => BasicValue::Reference(None),
                }
            }
            _ => BasicValue::produced_by(insn),
        }
    }

    fn nary_operation(
        &self,
        _at: InsnIndex,
        insn: &Instruction,
        _values: &[BasicValue],
    ) -> BasicValue {
        BasicValue::produced_by(insn)
    }

    fn merge(&self, value1: &BasicValue, value2: &BasicValue) -> BasicValue {
        if value1 == value2 {
            return value1.clone();
        }
        match (value1, value2) {
            (BasicValue::Uninitialized, _) | (_, BasicValue::Uninitialized) => {
                BasicValue::Uninitialized
            }
            (BasicValue::Reference(ref1), BasicValue::Reference(ref2)) => {
                BasicValue::Reference(self.merge_references(ref1, ref2))
            }
            _ => BasicValue::Conflict,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassData, ClassGraphArenas, JavaLibrary};
    use crate::jvm::{Name, ParseDescriptor};

    fn ref_type(descriptor: &str) -> BasicValue {
        BasicValue::Reference(Some(RefType::parse(descriptor).unwrap()))
    }

    #[test]
    fn symbols() {
        let values = vec![
            BasicValue::Uninitialized,
            BasicValue::Int,
            BasicValue::Float,
            BasicValue::Long,
            BasicValue::Double,
            BasicValue::Reference(None),
            ref_type("[I"),
            BasicValue::ReturnAddress,
            BasicValue::Conflict,
        ];
        let rendered: Vec<String> = values.iter().map(|value| value.to_string()).collect();
        assert_eq!(rendered, vec![".", "I", "F", "J", "D", "R", "[I", "A", "X"]);
        assert_eq!(BasicValue::Long.width(), 2);
        assert_eq!(ref_type("Ljava/lang/String;").to_string(), "Ljava/lang/String;");
    }

    #[test]
    fn merges_without_class_graph() {
        let interpreter = BasicInterpreter::new();
        let string = ref_type("Ljava/lang/String;");
        let object = ref_type("Ljava/lang/Object;");

        assert_eq!(interpreter.merge(&string, &string), string);
        assert_eq!(
            interpreter.merge(&string, &object),
            BasicValue::Reference(None)
        );
        assert_eq!(
            interpreter.merge(&BasicValue::Reference(None), &string),
            BasicValue::Reference(None)
        );
        assert_eq!(
            interpreter.merge(&BasicValue::Int, &string),
            BasicValue::Conflict
        );
        assert_eq!(
            interpreter.merge(&BasicValue::ReturnAddress, &BasicValue::Int),
            BasicValue::Conflict
        );

        // Assigned on one path only
        assert_eq!(
            interpreter.merge(&BasicValue::Uninitialized, &BasicValue::Int),
            BasicValue::Uninitialized
        );
        assert!(!interpreter
            .merge(&string, &BasicValue::Uninitialized)
            .is_conflict());

        // Idempotent once conflicted, and still unusable when merged with an unassigned slot
        let conflict = interpreter.merge(&BasicValue::Float, &BasicValue::Int);
        assert_eq!(interpreter.merge(&conflict, &BasicValue::Int), conflict);
        assert!(conflict.is_conflict());
        assert_eq!(
            interpreter.merge(&conflict, &BasicValue::Uninitialized),
            BasicValue::Uninitialized
        );
    }

    #[test]
    fn merges_with_class_graph() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let java = JavaLibrary::add_to_graph(&graph);
        let custom = BinaryName::from_string(String::from("com/example/Failure")).unwrap();
        graph.add_class(ClassData::new(custom.clone(), Some(java.runtime_exception)));

        let interpreter = BasicInterpreter::with_class_graph(&graph);
        let merged = interpreter.merge(
            &BasicValue::object(custom),
            &BasicValue::object(BinaryName::EXCEPTION),
        );
        assert_eq!(merged, BasicValue::object(BinaryName::EXCEPTION));

        // Merging again changes nothing
        let again = interpreter.merge(&merged, &BasicValue::object(BinaryName::EXCEPTION));
        assert_eq!(again, merged);

        assert_eq!(
            interpreter.merge(&ref_type("[I"), &ref_type("[J")),
            BasicValue::Reference(None)
        );
    }

    #[test]
    fn produced_values() {
        let interpreter = BasicInterpreter::new();
        let at = InsnIndex(0);
        assert_eq!(
            interpreter.new_operation(at, &Instruction::LConst1),
            BasicValue::Long
        );
        assert_eq!(
            interpreter.new_operation(at, &Instruction::NewArray(BaseType::Int)),
            ref_type("[I")
        );
        assert_eq!(
            interpreter.unary_operation(at, &Instruction::I2D, &BasicValue::Int),
            BasicValue::Double
        );
        assert_eq!(
            interpreter.binary_operation(
                at,
                &Instruction::AALoad,
                &ref_type("[[Ljava/lang/String;"),
                &BasicValue::Int
            ),
            ref_type("[Ljava/lang/String;")
        );

        let handler = ExceptionHandler {
            start: InsnIndex(0),
            end: InsnIndex(1),
            handler: InsnIndex(1),
            catch_type: None,
        };
        assert_eq!(
            interpreter.new_exception(0, &handler),
            BasicValue::object(BinaryName::THROWABLE)
        );
    }
}
