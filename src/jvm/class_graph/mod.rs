use super::BinaryName;
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::collections::HashSet;
use std::fmt;
use typed_arena::Arena;

mod java_lib_types;

pub use java_lib_types::*;

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the superclass and interface relationships between classes
///
/// The analysis only ever asks one question of this: what is the nearest common superclass of two
/// classes? That is how two reference values of different types get merged. Classes are
/// allocated in an arena so they can point at each other freely, and can be added to a graph
/// that is already being shared.
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: FrozenMap<&'g BinaryName, &'g ClassData<'g>>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            classes: FrozenMap::new(),
        }
    }

    pub fn lookup_class(&self, name: &BinaryName) -> Option<&ClassData<'g>> {
        self.classes.get(name)
    }

    /// Add a new class to the class graph
    pub fn add_class(&self, data: ClassData<'g>) -> &'g ClassData<'g> {
        let data = &*self.arenas.class_arena.alloc(data);
        self.classes.insert(&data.name, data);
        data
    }

    /// Nearest class that both classes extend
    ///
    /// Interfaces are not considered: if either side is an interface, the answer is `Object`.
    /// Returns `None` if either class is not in the graph.
    pub fn common_superclass(
        &self,
        class1: &BinaryName,
        class2: &BinaryName,
    ) -> Option<BinaryName> {
        if class1 == class2 {
            return Some(class1.clone());
        }

        let data1 = self.lookup_class(class1)?;
        let data2 = self.lookup_class(class2)?;
        if data1.is_interface || data2.is_interface {
            return Some(BinaryName::OBJECT);
        }

        let ancestors1: HashSet<&BinaryName> = data1.superclasses().map(|cls| &cls.name).collect();
        let found = data2
            .superclasses()
            .find(|cls| ancestors1.contains(&cls.name))
            .map(|cls| cls.name.clone());
        Some(found.unwrap_or(BinaryName::OBJECT))
    }
}

pub struct ClassData<'g> {
    pub name: BinaryName,
    pub superclass: Option<&'g ClassData<'g>>,
    pub interfaces: FrozenVec<&'g ClassData<'g>>,
    pub is_interface: bool,
}

impl<'g> ClassData<'g> {
    pub fn new(name: BinaryName, superclass: Option<&'g ClassData<'g>>) -> ClassData<'g> {
        ClassData {
            name,
            superclass,
            interfaces: FrozenVec::new(),
            is_interface: false,
        }
    }

    /// Interfaces always have `Object` as their superclass
    pub fn new_interface(name: BinaryName, object: &'g ClassData<'g>) -> ClassData<'g> {
        ClassData {
            name,
            superclass: Some(object),
            interfaces: FrozenVec::new(),
            is_interface: true,
        }
    }

    pub fn add_interface(&self, interface: &'g ClassData<'g>) {
        self.interfaces.push(interface);
    }

    /// This class, followed by its superclass, then its superclass' superclass, etc.
    pub fn superclasses(&self) -> impl Iterator<Item = &ClassData<'g>> {
        std::iter::successors(Some(self), |cls| cls.superclass)
    }
}

impl<'g> fmt::Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassData")
            .field("name", &self.name)
            .field("superclass", &self.superclass.map(|cls| &cls.name))
            .field("is_interface", &self.is_interface)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

    #[test]
    fn common_superclasses() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let lang = JavaLibrary::add_to_graph(&graph);

        let illegal_state = BinaryName::from_string(String::from("java/lang/IllegalStateException"))
            .unwrap();
        graph.add_class(ClassData::new(
            illegal_state.clone(),
            Some(lang.runtime_exception),
        ));

        assert_eq!(
            graph.common_superclass(&illegal_state, &BinaryName::EXCEPTION),
            Some(BinaryName::EXCEPTION)
        );
        assert_eq!(
            graph.common_superclass(&BinaryName::RUNTIMEEXCEPTION, &illegal_state),
            Some(BinaryName::RUNTIMEEXCEPTION)
        );
        assert_eq!(
            graph.common_superclass(&BinaryName::STRING, &BinaryName::THROWABLE),
            Some(BinaryName::OBJECT)
        );
        assert_eq!(
            graph.common_superclass(&BinaryName::STRING, &BinaryName::SERIALIZABLE),
            Some(BinaryName::OBJECT)
        );

        let unknown = BinaryName::from_string(String::from("com/example/Unknown")).unwrap();
        assert_eq!(graph.common_superclass(&unknown, &BinaryName::STRING), None);
        assert_eq!(
            graph.common_superclass(&illegal_state, &illegal_state),
            Some(illegal_state.clone())
        );
    }
}
