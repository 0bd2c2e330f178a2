use super::{BinaryName, ClassData, ClassGraph};

/// Standard classes that show up as the types of values produced by bytecode instructions
/// (constants, exceptions, arrays)
pub struct JavaLibrary<'g> {
    pub object: &'g ClassData<'g>,
    pub cloneable: &'g ClassData<'g>,
    pub serializable: &'g ClassData<'g>,
    pub string: &'g ClassData<'g>,
    pub class: &'g ClassData<'g>,
    pub method_type: &'g ClassData<'g>,
    pub method_handle: &'g ClassData<'g>,
    pub throwable: &'g ClassData<'g>,
    pub exception: &'g ClassData<'g>,
    pub runtime_exception: &'g ClassData<'g>,
}

impl<'g> JavaLibrary<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> JavaLibrary<'g> {
        let object = class_graph.add_class(ClassData::new(BinaryName::OBJECT, None));
        let cloneable =
            class_graph.add_class(ClassData::new_interface(BinaryName::CLONEABLE, object));
        let serializable =
            class_graph.add_class(ClassData::new_interface(BinaryName::SERIALIZABLE, object));

        let string = class_graph.add_class(ClassData::new(BinaryName::STRING, Some(object)));
        string.add_interface(serializable);
        let class = class_graph.add_class(ClassData::new(BinaryName::CLASS, Some(object)));
        class.add_interface(serializable);
        let method_type =
            class_graph.add_class(ClassData::new(BinaryName::METHODTYPE, Some(object)));
        method_type.add_interface(serializable);
        let method_handle =
            class_graph.add_class(ClassData::new(BinaryName::METHODHANDLE, Some(object)));

        let throwable = class_graph.add_class(ClassData::new(BinaryName::THROWABLE, Some(object)));
        throwable.add_interface(serializable);
        let exception =
            class_graph.add_class(ClassData::new(BinaryName::EXCEPTION, Some(throwable)));
        let runtime_exception = class_graph.add_class(ClassData::new(
            BinaryName::RUNTIMEEXCEPTION,
            Some(exception),
        ));

        JavaLibrary {
            object,
            cloneable,
            serializable,
            string,
            class,
            method_type,
            method_handle,
            throwable,
            exception,
            runtime_exception,
        }
    }
}
