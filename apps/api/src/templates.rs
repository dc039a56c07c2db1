//! Template Gallery: bundled, read-only starting points for a resume.

use serde::Serialize;

/// A pre-filled HTML document usable as the initial page content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Template {
    pub id: u32,
    pub name: &'static str,
    /// CSS font stack the template was designed for.
    pub font: &'static str,
    pub content: &'static str,
}

const MODERN: &str = r#"<h1>John Doe</h1>
<p><strong>Email:</strong> john@example.com | <strong>Phone:</strong> 123-456-7890 | <strong>LinkedIn:</strong> linkedin.com/in/johndoe</p>
<h2>Professional Summary</h2>
<p>Experienced software developer with expertise in JavaScript, React, and Python. Strong problem-solving and communication skills.</p>
<h2>Skills</h2>
<ul>
<li>JavaScript / React / Node.js</li>
<li>Python / Django / FastAPI</li>
<li>SQL / NoSQL Databases</li>
<li>REST APIs & Microservices</li>
</ul>
<h2>Experience</h2>
<p>Software Engineer | Company A | Jan 2021 – Present</p>
<ul>
<li>Developed web applications using React and Node.js</li>
<li>Implemented REST APIs and database schemas</li>
<li>Optimized code for performance and scalability</li>
</ul>
<p>Junior Developer | Company B | Jun 2019 – Dec 2020</p>
<ul>
<li>Worked on backend services using Python and Django</li>
<li>Collaborated in Agile teams for project delivery</li>
</ul>
<h2>Education</h2>
<p>Bachelor of Science in Computer Science | University Name | 2015 – 2019</p>"#;

const CLASSIC: &str = r#"<h1>Jane Smith</h1>
<p>Email: jane@example.com | Phone: 987-654-3210 | LinkedIn: linkedin.com/in/janesmith</p>
<h2>Profile</h2>
<p>Motivated professional with experience in project management, team leadership, and process improvement.</p>
<h2>Skills</h2>
<ul>
<li>Project Management (Agile/Scrum)</li>
<li>Process Optimization</li>
<li>Microsoft Office & Google Workspace</li>
<li>Communication & Collaboration</li>
</ul>
<h2>Work Experience</h2>
<p>Project Manager | Company C | Jan 2020 – Present</p>
<ul>
<li>Managed cross-functional teams to deliver projects on time</li>
<li>Implemented new workflow systems to improve efficiency</li>
</ul>
<p>Coordinator | Company D | Jul 2017 – Dec 2019</p>
<ul>
<li>Assisted in planning and executing projects</li>
<li>Tracked progress and prepared status reports</li>
</ul>
<h2>Education</h2>
<p>Master’s in Business Administration | University Name | 2015 – 2017</p>"#;

const ATS_OPTIMIZED: &str = r#"<h1>Full Name</h1>
<p>Email: your.email@example.com | Phone: 123-456-7890 | LinkedIn: linkedin.com/in/yourprofile</p>
<h2>Professional Summary</h2>
<p>Detail-oriented professional with [X years] experience in [industry]. Skilled in [key skills].</p>
<h2>Skills</h2>
<ul>
<li>Skill 1</li>
<li>Skill 2</li>
<li>Skill 3</li>
<li>Skill 4</li>
</ul>
<h2>Experience</h2>
<p>Job Title | Company | Start – End</p>
<ul>
<li>Responsibility 1</li>
<li>Responsibility 2</li>
<li>Responsibility 3</li>
</ul>
<p>Job Title | Company | Start – End</p>
<ul>
<li>Responsibility 1</li>
<li>Responsibility 2</li>
</ul>
<h2>Education</h2>
<p>Degree | University | Year</p>"#;

static TEMPLATES: [Template; 3] = [
    Template {
        id: 1,
        name: "Modern",
        font: "Arial, sans-serif",
        content: MODERN,
    },
    Template {
        id: 2,
        name: "Classic",
        font: "Times New Roman, serif",
        content: CLASSIC,
    },
    Template {
        id: 3,
        name: "ATS Optimized",
        font: "Calibri, sans-serif",
        content: ATS_OPTIMIZED,
    },
];

pub fn list() -> &'static [Template] {
    &TEMPLATES
}

pub fn find(id: u32) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.id == id)
}
