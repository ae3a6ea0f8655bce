use glam::Mat4;

use super::{Handle, Material, Mesh};

/// One node of a prefab hierarchy.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub local: Mat4,
    pub mesh: Option<Handle<Mesh>>,
    pub material: Option<Handle<Material>>,
    pub visible: bool,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl Node {
    pub fn new(name: impl Into<String>, local: Mat4) -> Self {
        Self {
            name: name.into(),
            local,
            mesh: None,
            material: None,
            visible: true,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: Handle<Mesh>, material: Handle<Material>) -> Self {
        self.mesh = Some(mesh);
        self.material = Some(material);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

/// A reusable node tree stored as an arena; links are indices into `nodes`.
#[derive(Debug, Clone, Default)]
pub struct Prefab {
    pub name: String,
    nodes: Vec<Node>,
    roots: Vec<usize>,
}

impl Prefab {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Convenience for the common single-mesh prefab.
    pub fn single(name: impl Into<String>, mesh: Handle<Mesh>, material: Handle<Material>) -> Self {
        let name = name.into();
        let mut prefab = Self::new(name.clone());
        prefab.add_node(None, Node::new(name, Mat4::IDENTITY).with_mesh(mesh, material));
        prefab
    }

    /// Insert `node` under `parent` (or as a root) and return its index.
    ///
    /// An out-of-range parent makes the node a root.
    pub fn add_node(&mut self, parent: Option<usize>, mut node: Node) -> usize {
        let index = self.nodes.len();
        let parent = parent.filter(|&p| p < self.nodes.len());
        node.parent = parent;
        node.children.clear();
        self.nodes.push(node);
        match parent {
            Some(p) => self.nodes[p].children.push(index),
            None => self.roots.push(index),
        }
        index
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Global transform of one node: root transform times the chain of
    /// ancestor locals.
    pub fn global_transform(&self, index: usize, root: Mat4) -> Option<Mat4> {
        let mut chain = Vec::new();
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            let node = self.nodes.get(i)?;
            chain.push(node.local);
            cursor = node.parent;
        }
        Some(chain.iter().rev().fold(root, |acc, local| acc * *local))
    }

    /// Depth-first walk over visible nodes with their global transforms.
    /// Hidden nodes prune their whole subtree.
    pub fn visit_visible<F>(&self, root: Mat4, mut f: F)
    where
        F: FnMut(&Node, Mat4),
    {
        let mut stack: Vec<(usize, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|&index| (index, root))
            .collect();

        while let Some((index, parent_global)) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            let global = parent_global * node.local;
            f(node, global);
            for &child in node.children.iter().rev() {
                stack.push((child, global));
            }
        }
    }
}
