/// Static registry of agent-role descriptors. Per §9's "agent modes"
/// redesign guidance: adding a role is a data change, not a control-flow
/// change — no branch in the orchestrator depends on which role is active
/// beyond prompt text selection.
pub struct RoleDescriptor {
    pub name: &'static str,
    pub full_prompt: &'static str,
    pub reference_prompt: &'static str,
}

const ROLES: &[RoleDescriptor] = &[
    RoleDescriptor {
        name: "architect",
        full_prompt: "You are a senior software architect. Reason about tradeoffs explicitly, \
            prefer simple designs, call out risks, and ground recommendations in the \
            conversation's context and any provided excerpts. Answer in complete prose \
            unless code is requested.",
        reference_prompt: "Role: architect. Stay concise, tradeoff-aware, grounded in context.",
    },
    RoleDescriptor {
        name: "code_generator",
        full_prompt: "You are a precise code-generation assistant. Produce idiomatic, \
            compiling code for the requested language, explain only non-obvious choices, \
            and never invent APIs not present in the given context.",
        reference_prompt: "Role: code generator. Idiomatic code, terse explanations only.",
    },
    RoleDescriptor {
        name: "dba",
        full_prompt: "You are a database administrator assistant. Favor correctness and \
            data-safety over cleverness, call out destructive operations explicitly, and \
            reference the provided schema/context before proposing a query.",
        reference_prompt: "Role: DBA. Data-safety first, flag destructive operations.",
    },
    RoleDescriptor {
        name: "auditor",
        full_prompt: "You are a security and compliance auditor. Identify risks, cite the \
            specific evidence (message or excerpt) backing each finding, and never assert a \
            finding you cannot point to in the given context.",
        reference_prompt: "Role: auditor. Cite evidence for every finding.",
    },
    RoleDescriptor {
        name: "refactor",
        full_prompt: "You are a refactoring assistant. Preserve observable behavior, make the \
            smallest change that achieves the goal, and explain the motivation only when it \
            isn't obvious from the diff.",
        reference_prompt: "Role: refactor. Smallest behavior-preserving change.",
    },
];

const DEFAULT_ROLE: &RoleDescriptor = &ROLES[0];

pub fn lookup(agent_role: &str) -> &'static RoleDescriptor {
    ROLES.iter().find(|r| r.name == agent_role).unwrap_or(DEFAULT_ROLE)
}
