//! Browser chat shell served at `/` and `/lamino`.
//!
//! A single self-contained page; everything it shows comes from the JSON API.

use lamino_core::models::User;

const SHELL: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Lamino</title>
<style>
body{margin:0;font-family:system-ui,sans-serif;display:flex;height:100vh;background:#0f1117;color:#e5e7eb}
aside{width:260px;border-right:1px solid #262a36;padding:12px;display:flex;flex-direction:column;gap:8px}
main{flex:1;display:flex;flex-direction:column}
#messages{flex:1;overflow-y:auto;padding:16px}
.msg{margin:8px 0;padding:10px 12px;border-radius:8px;white-space:pre-wrap}
.user{background:#1e293b}.assistant{background:#161b22}
.meta{font-size:.75rem;color:#9ca3af;margin-top:4px}
form{display:flex;gap:8px;padding:12px;border-top:1px solid #262a36}
textarea{flex:1;background:#161b22;color:inherit;border:1px solid #262a36;border-radius:6px;padding:8px}
button,select{background:#2563eb;color:#fff;border:0;border-radius:6px;padding:6px 10px;cursor:pointer}
select{background:#161b22;border:1px solid #262a36}
.ws{cursor:pointer;padding:6px;border-radius:4px}.ws.active{background:#1e293b}
</style>
</head>
<body>
<aside>
  <strong>Lamino</strong>
  <span class="meta">{{USER_NAME}}</span>
  <button id="newWs">New workspace</button>
  <div id="workspaces"></div>
  <select id="model"></select>
  <a href="/auth/logout" class="meta">Sign out</a>
</aside>
<main>
  <div id="messages"></div>
  <form id="composer">
    <input type="file" id="file">
    <textarea id="input" rows="2" placeholder="Message"></textarea>
    <button type="submit">Send</button>
  </form>
</main>
<script>
const API = '/api';
let current = null;
let attached = [];

async function api(path, opts = {}) {
  const res = await fetch(API + path, { credentials: 'same-origin', ...opts });
  if (res.status === 401) { location.href = '/auth/login'; throw new Error('auth'); }
  return res;
}

function render(msg) {
  const el = document.createElement('div');
  el.className = 'msg ' + msg.role;
  el.textContent = msg.content;
  if (msg.decision_chain) {
    const meta = document.createElement('div');
    meta.className = 'meta';
    meta.textContent = msg.decision_chain.map(s => s.node).join(' > ') + ' (' + (msg.latency_ms || 0) + 'ms)';
    el.appendChild(meta);
  }
  document.getElementById('messages').appendChild(el);
  return el;
}

async function selectWorkspace(ws) {
  current = ws;
  document.querySelectorAll('.ws').forEach(e => e.classList.toggle('active', e.dataset.id === ws.id));
  document.getElementById('messages').innerHTML = '';
  const { history } = await (await api('/workspaces/' + ws.id + '/history')).json();
  history.forEach(render);
}

async function loadWorkspaces() {
  const { workspaces } = await (await api('/workspaces')).json();
  const list = document.getElementById('workspaces');
  list.innerHTML = '';
  workspaces.forEach(ws => {
    const el = document.createElement('div');
    el.className = 'ws';
    el.dataset.id = ws.id;
    el.textContent = ws.name;
    el.onclick = () => selectWorkspace(ws);
    list.appendChild(el);
  });
  if (workspaces.length && !current) selectWorkspace(workspaces[0]);
}

async function loadModels() {
  const { models } = await (await api('/models')).json();
  const select = document.getElementById('model');
  models.forEach(m => {
    const opt = document.createElement('option');
    opt.value = m.provider + '|' + m.id;
    opt.textContent = m.provider_name + ': ' + m.name;
    opt.disabled = !m.available;
    select.appendChild(opt);
  });
}

document.getElementById('newWs').onclick = async () => {
  const name = prompt('Workspace name');
  if (!name) return;
  await api('/workspaces', { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify({ name }) });
  loadWorkspaces();
};

document.getElementById('file').onchange = async (e) => {
  const form = new FormData();
  form.append('file', e.target.files[0]);
  if (current) form.append('workspace_id', current.id);
  const data = await (await api('/upload', { method: 'POST', body: form })).json();
  if (data.file) attached.push(data.file.id);
};

document.getElementById('composer').onsubmit = async (e) => {
  e.preventDefault();
  const input = document.getElementById('input');
  const message = input.value.trim();
  if (!message && !attached.length) return;
  const [provider, model] = document.getElementById('model').value.split('|');
  render({ role: 'user', content: message });
  input.value = '';
  const files = attached; attached = [];
  const reply = render({ role: 'assistant', content: '' });
  const res = await api('/chat', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ workspace_id: current && current.id, message, model, provider, files, stream: true }),
  });
  const reader = res.body.getReader();
  const decoder = new TextDecoder();
  let buffer = '';
  for (;;) {
    const { value, done } = await reader.read();
    if (done) break;
    buffer += decoder.decode(value, { stream: true });
    const events = buffer.split('\n\n');
    buffer = events.pop();
    for (const ev of events) {
      const data = ev.replace(/^data: /, '');
      if (data === '[DONE]') continue;
      const chunk = JSON.parse(data);
      if (chunk.error) reply.textContent += '\n[' + chunk.error + ']';
      else if (chunk.metadata) render({ role: 'meta', content: '', ...chunk.metadata }).className = 'meta';
      else reply.textContent += (chunk.choices?.[0]?.delta?.content || '');
    }
  }
};

loadWorkspaces();
loadModels();
</script>
</body>
</html>
"#;

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// The chat page for a signed-in user.
pub fn chat_shell(user: &User) -> String {
    SHELL.replace("{{USER_NAME}}", &escape_html(&user.name))
}
