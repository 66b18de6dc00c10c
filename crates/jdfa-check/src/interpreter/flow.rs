//! Static control-flow graph of an instruction list.
//!
//! Node `i` is instruction `i`; an extra node at `len` stands for falling off
//! the end of the body. The runner uses the graph to find join points, where
//! pending states are merged, and loop heads, where states are widened.

use std::collections::BTreeSet;

use petgraph::algo::dominators;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use jdfa_core::Instruction;

use super::error::AnalysisError;

#[derive(Debug)]
pub(crate) struct FlowGraph {
    graph: DiGraph<usize, ()>,
    join_points: BTreeSet<usize>,
    loop_heads: BTreeSet<usize>,
}

impl FlowGraph {
    pub(crate) fn build(instructions: &[Instruction]) -> Result<FlowGraph, AnalysisError> {
        let len = instructions.len();
        let mut graph = DiGraph::with_capacity(len + 1, len * 2);
        for ip in 0..=len {
            graph.add_node(ip);
        }
        for (ip, instruction) in instructions.iter().enumerate() {
            if instruction.falls_through() {
                graph.add_edge(NodeIndex::new(ip), NodeIndex::new(ip + 1), ());
            }
            for target in instruction.branch_targets() {
                if target > len {
                    return Err(AnalysisError::JumpOutOfRange { ip, target });
                }
                graph.add_edge(NodeIndex::new(ip), NodeIndex::new(target), ());
            }
        }

        let join_points = (0..=len)
            .filter(|ip| {
                graph
                    .neighbors_directed(NodeIndex::new(*ip), Direction::Incoming)
                    .count()
                    > 1
            })
            .collect();

        // Targets of back edges: either the target dominates the source, or
        // the edge goes backwards in layout order (irreducible loops).
        let doms = dominators::simple_fast(&graph, NodeIndex::new(0));
        let mut loop_heads = BTreeSet::new();
        for edge in graph.edge_references() {
            let (from, to) = (edge.source(), edge.target());
            let Some(mut dominators_of_from) = doms.dominators(from) else {
                continue;
            };
            if to.index() <= from.index() || dominators_of_from.any(|d| d == to) {
                loop_heads.insert(to.index());
            }
        }

        Ok(FlowGraph {
            graph,
            join_points,
            loop_heads,
        })
    }

    pub(crate) fn is_join_point(&self, ip: usize) -> bool {
        self.join_points.contains(&ip)
    }

    pub(crate) fn is_loop_head(&self, ip: usize) -> bool {
        self.loop_heads.contains(&ip)
    }

    /// Instructions no path from the entry reaches.
    pub(crate) fn unreachable(&self) -> Vec<usize> {
        let mut dfs = petgraph::visit::Dfs::new(&self.graph, NodeIndex::new(0));
        let mut seen = BTreeSet::new();
        while let Some(node) = dfs.next(&self.graph) {
            seen.insert(node.index());
        }
        (0..self.graph.node_count().saturating_sub(1))
            .filter(|ip| !seen.contains(ip))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdfa_core::{ConstValue, JType, Operand};

    fn push_true() -> Instruction {
        Instruction::push(Operand::constant(ConstValue::Bool(true), JType::BOOLEAN))
    }

    #[test]
    fn straight_line_has_no_joins_or_loops() {
        let body = vec![
            push_true(),
            Instruction::Pop,
            Instruction::Return {
                has_value: false,
                anchor: None,
            },
        ];
        let flow = FlowGraph::build(&body).unwrap();
        assert!((0..=3).all(|ip| !flow.is_join_point(ip) && !flow.is_loop_head(ip)));
        assert!(flow.unreachable().is_empty());
    }

    #[test]
    fn diamond_joins_after_both_arms() {
        // 0: push; 1: if true goto 4; 2: push; 3: pop; 4: return
        let body = vec![
            push_true(),
            Instruction::ConditionalGoto {
                target: 4,
                jump_if: true,
                anchor: None,
            },
            push_true(),
            Instruction::Pop,
            Instruction::Return {
                has_value: false,
                anchor: None,
            },
        ];
        let flow = FlowGraph::build(&body).unwrap();
        assert!(flow.is_join_point(4));
        assert!(!flow.is_loop_head(4));
    }

    #[test]
    fn backward_jump_marks_loop_head() {
        // 0: push; 1: if true goto 3; 2: goto 0; 3: return
        let body = vec![
            push_true(),
            Instruction::ConditionalGoto {
                target: 3,
                jump_if: true,
                anchor: None,
            },
            Instruction::Goto { target: 0 },
            Instruction::Return {
                has_value: false,
                anchor: None,
            },
        ];
        let flow = FlowGraph::build(&body).unwrap();
        assert!(flow.is_loop_head(0));
        assert!(!flow.is_loop_head(3));
    }

    #[test]
    fn jump_past_the_end_is_rejected() {
        let body = vec![Instruction::Goto { target: 9 }];
        assert_eq!(
            FlowGraph::build(&body).unwrap_err(),
            AnalysisError::JumpOutOfRange { ip: 0, target: 9 }
        );
    }

    #[test]
    fn code_after_return_is_unreachable() {
        let body = vec![
            Instruction::Return {
                has_value: false,
                anchor: None,
            },
            push_true(),
        ];
        let flow = FlowGraph::build(&body).unwrap();
        assert_eq!(flow.unreachable(), vec![1]);
    }
}
