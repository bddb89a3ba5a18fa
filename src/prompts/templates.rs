//! Raw prompt templates (tera syntax)

pub const TOOLS: &str = r#"Tools{% for tool in tools %}
- {{ loop.index }}: {{ tool.name }}
- Description: {{ tool.description }}
- Input Schema: {{ tool.input_schema }}{% endfor %}
"#;

pub const CALLED_TOOLS: &str = r#"
Previous tools have been called.{% for tool in called_tools %}
- Tool: {{ tool.name }}
- Arguments: {{ tool.arguments }}
- Status: {% if tool.succeeded %}success{% else %}error{% endif %}
- Result:
```
{{ tool.result }}
```{% endfor %}
"#;

pub const TOOL_DECISION: &str = r#"Your duty is to decide which tool to use to answer the question.
The question is:

{{ question }}

{{ called_tools }}

{{ tools }}

You must answer in the following format:

<thoughts>
thoughts:
- ...
- ...
- ...
</thoughts>

<selected_tools>
```json
[
    {
        "name": "tool_name",
        "arguments": {
            "argument_name": "argument_value"
        }
    }
]
```
</selected_tools>

<Answer>
YOUR ANSWER HERE. IF YOU STILL NEED TO CALL MORE TOOLS TO ANSWER THE QUESTION, LEAVE THIS BLANK.
</Answer>

Note:
- You can leave the selected tools out entirely if none of the tools are relevant or the given context is enough to answer the question.
- You can select multiple tools if multiple tools are relevant to the question.
- Your `tool_name` must be one of the tool names in the tools list, spelled exactly.
- If there is no need to call any tool, answer the question.
{% if tone %}
Answer tone: {{ tone }}
{% endif %}"#;

pub const AVAILABLE_AGENTS: &str = r#"# Agent contexts

These are the agents that can be consulted to answer the question
{% for agent in agents %}
Agent index: {{ loop.index }}
Agent name: {{ agent.name }}
Agent description: {{ agent.description }}
Agent skills: {% for skill in agent.skills %}
    - name: {{ skill.name }}
        - description: {{ skill.description }}
        - example: {{ skill.examples | join(sep="; ") }}{% endfor %}
{% endfor %}
-------------------"#;

pub const AGENT_ANSWERS: &str = r#"
Previous agents have been called.{% for agent in called_agents %}
- Agent: {{ agent.name }}
- Prompt: {{ agent.prompt }}
- Status: {% if agent.succeeded %}success{% else %}error{% endif %}
- Answer: {{ agent.answer }}
-------{% endfor %}
"#;

pub const AGENT_DECISION: &str = r#"Your duty is to decide which agent to consult or ask for help to answer the question.
The question is:

{{ question }}

{{ agent_answers }}

{{ agents }}

You must answer in the following format:

<thoughts>
thoughts:
- ...
- ...
- ...
</thoughts>

<selected_agents>
```json
[
    {
        "index": 1,
        "name": "agent_name",
        "prompt": "prompt_to_agent"
    }
]
```
</selected_agents>

Note:
- You can leave the selected agents out entirely if none of the agents are relevant or the given context is enough to answer the question.
- You can select multiple agents if multiple agents are relevant to the question.
- Your selected agents must exist in the agents list, and `agent_name` must be spelled exactly.
- If there is no need to call any agent, give your answer in the following format:
{% if tone %}
Answer tone: {{ tone }}
{% endif %}
<answer>
Your answer here
</answer>
"#;
